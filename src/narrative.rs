//! Heuristic narrative retell scoring.
//!
//! Derives the four narrative language sub-scores (episode, sentence,
//! vocabulary, and narrative discourse complexity) from a transcript using
//! deterministic keyword and token statistics. This approximates hand
//! scoring for screening purposes; it is not a validated scoring model.

use std::collections::HashSet;

use anyhow::Context;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::models::{SubScore, SubScores, TranscriptAnalysis};

static DEFAULT_LEXICON: &str = include_str!("../data/narrative_lexicon.json");

/// Keyword lists driving the analyzer. Supplied as versioned configuration
/// so the vocabulary can be tuned without touching the scoring rules.
#[derive(Debug, Clone, Deserialize)]
pub struct Lexicon {
    pub subordinating: Vec<String>,
    pub relative_clause: Vec<String>,
    pub causal: Vec<String>,
    pub problem: Vec<String>,
    pub attempt: Vec<String>,
    pub consequence: Vec<String>,
}

impl Lexicon {
    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw).context("narrative lexicon is not valid JSON")
    }

    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_json(DEFAULT_LEXICON).context("embedded narrative lexicon is invalid")
    }
}

pub struct TranscriptAnalyzer {
    subordinating: Regex,
    relative_clause: Regex,
    causal: Regex,
    problem: Regex,
    attempt: Regex,
    consequence: Regex,
}

impl TranscriptAnalyzer {
    pub fn new(lexicon: &Lexicon) -> anyhow::Result<Self> {
        Ok(Self {
            subordinating: word_pattern(&lexicon.subordinating)?,
            relative_clause: word_pattern(&lexicon.relative_clause)?,
            causal: word_pattern(&lexicon.causal)?,
            problem: word_pattern(&lexicon.problem)?,
            attempt: word_pattern(&lexicon.attempt)?,
            consequence: word_pattern(&lexicon.consequence)?,
        })
    }

    pub fn with_builtin_lexicon() -> anyhow::Result<Self> {
        Self::new(&Lexicon::builtin()?)
    }

    /// Score a retell transcript. `None` for empty text and for bracketed
    /// placeholder markers left by the transcription pipeline.
    pub fn analyze(&self, transcript: &str) -> Option<TranscriptAnalysis> {
        let trimmed = transcript.trim();
        if trimmed.is_empty() || trimmed.starts_with('[') {
            return None;
        }

        let words: Vec<&str> = transcript.split_whitespace().collect();
        let word_count = words.len();
        let sentence_count = transcript
            .split(['.', '!', '?'])
            .filter(|fragment| !fragment.trim().is_empty())
            .count();

        let unique: HashSet<String> = words
            .iter()
            .map(|word| {
                word.trim_matches(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
                    .to_lowercase()
            })
            .filter(|word| !word.is_empty())
            .collect();
        let unique_words = unique.len();
        let ratio = unique_words as f64 / word_count.max(1) as f64;
        let type_token_ratio = (ratio * 1000.0).round() / 1000.0;

        let subordinating = self.subordinating.find_iter(transcript).count();
        let relative_clauses = self.relative_clause.find_iter(transcript).count();
        let causal = self.causal.find_iter(transcript).count();
        let problem = self.problem.find_iter(transcript).count();
        let attempt = self.attempt.find_iter(transcript).count();
        let consequence = self.consequence.find_iter(transcript).count();

        let has_problem = problem > 0;
        let has_attempt = attempt > 0;
        let has_consequence = consequence > 0;
        let episode_complete = has_problem && has_attempt && has_consequence;

        let ec_score = [has_problem, has_attempt, has_consequence]
            .iter()
            .filter(|present| **present)
            .count() as u8;
        let sc_score = (subordinating + relative_clauses).min(3) as u8;
        let vc_score: u8 = if ratio > 0.7 {
            3
        } else if ratio > 0.5 {
            2
        } else if ratio > 0.3 {
            1
        } else {
            0
        };
        let ndc_score: u8 = if episode_complete && subordinating >= 2 && ratio > 0.5 {
            3
        } else if episode_complete && subordinating >= 1 {
            2
        } else if has_problem || has_attempt {
            1
        } else {
            0
        };

        let yes_no = |present: bool| if present { "yes" } else { "no" };
        let sub_scores = SubScores {
            ec: SubScore {
                score: ec_score,
                max: 3,
                label: "Episode Complexity",
                detail: format!(
                    "Problem: {}, Attempt: {}, Consequence: {}",
                    yes_no(has_problem),
                    yes_no(has_attempt),
                    yes_no(has_consequence)
                ),
            },
            sc: SubScore {
                score: sc_score,
                max: 3,
                label: "Sentence Complexity",
                detail: format!(
                    "{subordinating} subordinating conjunctions, {relative_clauses} relative clauses"
                ),
            },
            vc: SubScore {
                score: vc_score,
                max: 3,
                label: "Vocabulary Complexity",
                detail: format!(
                    "Type-token ratio: {type_token_ratio} ({unique_words}/{word_count})"
                ),
            },
            ndc: SubScore {
                score: ndc_score,
                max: 3,
                label: "Narrative Discourse Complexity",
                detail: format!(
                    "Episode complete: {}, causal connectors: {causal}",
                    yes_no(episode_complete)
                ),
            },
        };

        Some(TranscriptAnalysis {
            word_count,
            sentence_count,
            unique_words,
            type_token_ratio,
            sub_scores,
            total: ec_score + sc_score + vc_score + ndc_score,
            max: 12,
        })
    }
}

fn word_pattern(words: &[String]) -> anyhow::Result<Regex> {
    let escaped: Vec<String> = words.iter().map(|word| regex::escape(word)).collect();
    RegexBuilder::new(&format!(r"\b({})\b", escaped.join("|")))
        .case_insensitive(true)
        .build()
        .context("invalid keyword pattern in narrative lexicon")
}
