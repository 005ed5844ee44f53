//! Explanation text over hand-built feature vectors

use voicedetect::explain::{detailed_analysis, Explainer, AI_RULES, HUMAN_RULES};
use voicedetect::features::idx;
use voicedetect::{FeatureContribution, FeatureVector, Label, N_FEATURES};

/// Feature vector with the given entries set and everything else at zero
fn vector_with(entries: &[(usize, f64)]) -> FeatureVector {
    let mut values = [0.0; N_FEATURES];
    for &(i, v) in entries {
        values[i] = v;
    }
    FeatureVector::from_slice(&values).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_tables_are_ordered_as_documented() {
        let ai: Vec<&str> = AI_RULES.iter().map(|r| r.phrase).collect();
        assert_eq!(
            ai,
            vec![
                "unnatural pitch consistency",
                "minimal spectral variations",
                "uniform energy distribution",
                "mechanical speech rhythm",
                "overly smooth harmonic structure",
            ]
        );
        assert_eq!(HUMAN_RULES[4].feature, idx::AUTOCORR_STD);
    }

    #[test]
    fn test_zero_vector_for_ai_label() {
        // Zeros satisfy the three "below" rules, which fill the phrase budget
        let explanation = Explainer::default().explain(Label::AiGenerated, 0.99, &vector_with(&[]), &[]);
        assert_eq!(
            explanation.text,
            "Strong indicators of AI generation: unnatural pitch consistency, \
             minimal spectral variations, uniform energy distribution"
        );
    }

    #[test]
    fn test_zero_vector_for_human_label() {
        let explanation = Explainer::default().explain(Label::Human, 0.55, &vector_with(&[]), &[]);
        assert_eq!(
            explanation.text,
            "Moderate indicators of human voice: human voice characteristics detected"
        );
    }

    #[test]
    fn test_tempo_and_harmonic_rules() {
        let features = vector_with(&[
            (idx::PITCH_STD, 50.0),
            (idx::FLATNESS_MEAN, 0.5),
            (idx::RMS_STD, 0.5),
            (idx::TEMPO, 120.0),
            (idx::HARMONIC_RATIO, 0.9),
        ]);
        let explanation = Explainer::default().explain(Label::AiGenerated, 0.75, &features, &[]);
        assert_eq!(
            explanation.text,
            "Clear indicators of AI generation: mechanical speech rhythm, overly smooth harmonic structure"
        );
    }

    #[test]
    fn test_phrase_budget_from_config() {
        let config = voicedetect::config::ExplainConfig {
            max_phrases: 1,
            ..Default::default()
        };
        let explanation = Explainer::new(&config).explain(Label::AiGenerated, 0.8, &vector_with(&[]), &[]);
        assert_eq!(
            explanation.text,
            "Clear indicators of AI generation: unnatural pitch consistency"
        );
    }

    #[test]
    fn test_text_is_never_empty() {
        let explainer = Explainer::default();
        for label in [Label::AiGenerated, Label::Human] {
            for confidence in [0.0, 0.5, 0.71, 0.95, f64::INFINITY] {
                let explanation = explainer.explain(label, confidence, &vector_with(&[]), &[]);
                assert!(!explanation.text.is_empty());
            }
        }
    }

    #[test]
    fn test_detailed_analysis_includes_evidence() {
        let evidence = vec![FeatureContribution {
            index: idx::TEMPO,
            name: "Tempo".to_string(),
            value: 118.0,
            importance: 0.07,
        }];
        let analysis = detailed_analysis(&vector_with(&[(idx::TEMPO, 118.0)]), &evidence);
        assert_eq!(analysis.prosody_analysis.tempo, 118.0);
        assert_eq!(analysis.top_contributing_features, evidence);

        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["top_contributing_features"][0]["name"], "Tempo");
        assert!(json["pitch_analysis"]["range"].is_number());
    }
}
