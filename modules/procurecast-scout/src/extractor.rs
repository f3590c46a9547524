//! Tier-1 entity extraction.
//!
//! A fixed ITS keyword ontology plus shallow recognisers for money, dates
//! and organisations. Every hit is stored with its enclosing sentence, in
//! the unverified state, for external review.

use std::fmt;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use procurecast_common::{EntityLabel, NewEntity};
use procurecast_store::ProcurementStore;

pub const ITS_KEYWORD_ONTOLOGY: [&str; 16] = [
    "Intelligent Transportation Systems",
    "ITS",
    "Advanced Traffic Management",
    "ATMS",
    "V2X",
    "V2V",
    "V2I",
    "Connected Vehicles",
    "Traffic Signal Priority",
    "TSP",
    "LIDAR",
    "ADAS",
    "Smart Corridor",
    "MaaS",
    "Mobility as a Service",
    "ANPR",
];

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December|Jan|Feb|Mar|Apr|Jun|Jul|Aug|Sep|Sept|Oct|Nov|Dec";

const ORG_HEADS: &str = "Department|Dept\\.|Authority|Council|Commission|Agency|Administration|District|Organization|Board|Bureau|Office|Corporation|Company|Association|Partnership|Institute|University|Inc\\.?|LLC";

/// One recognised span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub text: String,
    pub label: EntityLabel,
    pub context: String,
}

/// Compiled recognisers. Build once per process and pass by reference.
pub struct ExtractionContext {
    keywords: Regex,
    money: Regex,
    date: Regex,
    org: Regex,
    acronym: Regex,
    sentence_break: Regex,
}

impl ExtractionContext {
    pub fn new() -> Result<Self, regex::Error> {
        Self::with_ontology(&ITS_KEYWORD_ONTOLOGY)
    }

    /// Phrases match case-insensitively on word boundaries, longest first,
    /// with any run of whitespace between words.
    pub fn with_ontology(phrases: &[&str]) -> Result<Self, regex::Error> {
        let mut phrases: Vec<&str> = phrases.to_vec();
        phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
        let alternation = phrases
            .iter()
            .map(|p| {
                p.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect::<Vec<_>>()
            .join("|");

        Ok(Self {
            keywords: Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))?,
            money: Regex::new(
                r"(?i)(?:\$\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|billion|thousand|[mbk])\b)?|\b\d[\d,]*(?:\.\d+)?\s?(?:million|billion)?\s?(?:dollars|USD)\b)",
            )?,
            date: Regex::new(&format!(
                r"(?:\b(?:{MONTHS})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?,?\s+\d{{4}}\b|\b(?:{MONTHS})\.?\s+\d{{4}}\b|\b\d{{1,2}}/\d{{1,2}}/\d{{2,4}}\b|\b\d{{4}}-\d{{2}}-\d{{2}}\b|\b(?:FY|Fiscal Year)\s?\d{{2,4}}(?:-\d{{2,4}})?\b)"
            ))?,
            org: Regex::new(&format!(
                r"\b(?:[A-Z][A-Za-z&.\-]*\s+){{1,5}}(?:{ORG_HEADS})(?:\s+of(?:\s+the)?(?:\s+[A-Z][A-Za-z&.\-]*)+)?"
            ))?,
            acronym: Regex::new(r"\(([A-Z]{2,8})\)")?,
            sentence_break: Regex::new(r"[.!?]+[\s]+|\n\s*\n")?,
        })
    }

    /// Every mention in `text`, in order of appearance per recogniser.
    pub fn extract(&self, text: &str) -> Vec<Mention> {
        let sentences = self.sentence_spans(text);
        let context = |start: usize| -> String {
            let idx = sentences.partition_point(|&(_, end)| end <= start);
            let (s, e) = sentences.get(idx).copied().unwrap_or((0, text.len()));
            text[s..e].trim().to_string()
        };

        let mut mentions = Vec::new();
        for m in self.keywords.find_iter(text) {
            mentions.push(Mention {
                text: m.as_str().to_string(),
                label: EntityLabel::ItsTechnology,
                context: context(m.start()),
            });
        }

        let generic = [
            (&self.money, EntityLabel::Money),
            (&self.date, EntityLabel::Date),
            (&self.org, EntityLabel::Org),
        ];
        for (re, label) in generic {
            for m in re.find_iter(text) {
                mentions.push(Mention {
                    text: m.as_str().trim().to_string(),
                    label,
                    context: context(m.start()),
                });
            }
        }

        for cap in self.acronym.captures_iter(text) {
            let Some(m) = cap.get(1) else { continue };
            if self.keywords.is_match(m.as_str()) {
                continue;
            }
            mentions.push(Mention {
                text: m.as_str().to_string(),
                label: EntityLabel::Org,
                context: context(m.start()),
            });
        }

        mentions
    }

    /// Byte ranges of sentences, covering the whole text.
    fn sentence_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = 0;
        for brk in self.sentence_break.find_iter(text) {
            spans.push((start, brk.end()));
            start = brk.end();
        }
        if start < text.len() {
            spans.push((start, text.len()));
        }
        spans
    }
}

/// Counts from one extraction run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStats {
    pub documents: u32,
    pub entities: u64,
    pub without_entities: u32,
    pub failed: u32,
}

impl fmt::Display for ExtractStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "documents {}, entities {}, no entities {}, failed {}",
            self.documents, self.entities, self.without_entities, self.failed
        )
    }
}

/// Run tier-1 extraction over every document with text and no entities yet.
pub async fn extract_unprocessed(
    store: &dyn ProcurementStore,
    ctx: &ExtractionContext,
) -> Result<ExtractStats> {
    let docs = store
        .unprocessed_documents()
        .await
        .context("Failed to load unprocessed documents")?;
    info!(count = docs.len(), "Found new documents for entity extraction");

    let mut stats = ExtractStats::default();
    for doc in docs {
        stats.documents += 1;
        let entities: Vec<NewEntity> = ctx
            .extract(&doc.raw_text)
            .into_iter()
            .map(|m| NewEntity {
                source_id: doc.document_id,
                entity_text: m.text,
                label: m.label,
                context_sentence: m.context,
            })
            .collect();

        if entities.is_empty() {
            debug!(document_id = doc.document_id, "No entities found");
            stats.without_entities += 1;
            continue;
        }

        match store.insert_entities(&entities).await {
            Ok(n) => {
                debug!(document_id = doc.document_id, entities = n, "Entities stored");
                stats.entities += n;
            }
            Err(e) => {
                warn!(document_id = doc.document_id, error = %e, "Failed to store entities");
                stats.failed += 1;
            }
        }
    }

    info!(%stats, "Entity extraction complete");
    Ok(stats)
}
