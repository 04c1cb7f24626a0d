//! Test doubles for the external scorers.

#![allow(dead_code)]

use rustyeval::metrics::{AlignmentMeasures, CorpusScore, SegmentScorer, Wer};

/// Nameable aligner type, so registries can downcast to `Wer<AlignFn>`.
pub type AlignFn = fn(&str, &str) -> AlignmentMeasures;

pub fn positional_wer() -> Wer<AlignFn> {
    Wer::new(positional_aligner as AlignFn)
}

/// Word alignment by position. Good enough for counting tests.
pub fn positional_aligner(reference: &str, prediction: &str) -> AlignmentMeasures {
    let r: Vec<&str> = reference.split_whitespace().collect();
    let p: Vec<&str> = prediction.split_whitespace().collect();
    let common = r.len().min(p.len());
    let hits = r.iter().zip(&p).filter(|(a, b)| a == b).count();

    AlignmentMeasures {
        hits: hits as u64,
        substitutions: (common - hits) as u64,
        deletions: r.len().saturating_sub(p.len()) as u64,
        insertions: p.len().saturating_sub(r.len()) as u64,
    }
}

/// Unigram precision scorer: stats are `[matches, hypothesis_len, reference_len]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnigramScorer;

impl SegmentScorer for UnigramScorer {
    type ReferenceInfo = Vec<String>;

    fn extract_reference_info(&self, references: &[&str]) -> Vec<String> {
        references
            .iter()
            .flat_map(|r| r.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    fn segment_statistics(&self, hypothesis: &str, words: &Vec<String>) -> Vec<i64> {
        let tokens: Vec<&str> = hypothesis.split_whitespace().collect();
        let matched = tokens.iter().filter(|t| words.iter().any(|w| w == *t)).count();
        vec![matched as i64, tokens.len() as i64, words.len() as i64]
    }

    fn score_from_stats(&self, stats: &[i64], num_refs: usize) -> CorpusScore {
        let score = if stats[1] == 0 {
            0.0
        } else {
            100.0 * stats[0] as f64 / stats[1] as f64
        };
        CorpusScore {
            score,
            signature: format!("unigram|nrefs:{num_refs}"),
        }
    }
}

/// Evaluation corpus: (hypothesis, reference).
pub const CORPUS: &[(&str, &str)] = &[
    ("the cat sat on the mat", "the cat sat on the mat"),
    ("a dog barked", "the dog barked loudly"),
    ("hello world", "hello there world"),
    ("rust is fast", "rust is very fast"),
    ("one two three", "one two four"),
    ("good morning", "good evening"),
];
