use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters exported on `/metrics`.
#[derive(Clone)]
pub struct ReaderMetrics {
    registry: Registry,
    pub documents_processed: IntCounterVec,
    pub highlight_phrases: IntCounterVec,
    pub segmentation_anomalies: IntCounter,
}

impl ReaderMetrics {
    pub fn new(namespace: &str) -> prometheus::Result<Self> {
        let registry = Registry::new();

        let documents_processed = IntCounterVec::new(
            Opts::new("documents_processed_total", "Documents run through OCR")
                .namespace(namespace),
            &["outcome"],
        )?;
        let highlight_phrases = IntCounterVec::new(
            Opts::new("highlight_phrases_total", "Highlight phrases by match outcome")
                .namespace(namespace),
            &["outcome"],
        )?;
        let segmentation_anomalies = IntCounter::with_opts(
            Opts::new(
                "segmentation_anomalies_total",
                "OCR blobs whose marker count disagrees with the recovered pages",
            )
            .namespace(namespace),
        )?;

        registry.register(Box::new(documents_processed.clone()))?;
        registry.register(Box::new(highlight_phrases.clone()))?;
        registry.register(Box::new(segmentation_anomalies.clone()))?;

        Ok(Self {
            registry,
            documents_processed,
            highlight_phrases,
            segmentation_anomalies,
        })
    }

    pub fn record_match_stats(&self, stats: &studylens_utils::MatchStats) {
        self.highlight_phrases
            .with_label_values(&["matched"])
            .inc_by(stats.matched as u64);
        self.highlight_phrases
            .with_label_values(&["unmatched"])
            .inc_by(stats.unmatched as u64);
        self.highlight_phrases
            .with_label_values(&["fault"])
            .inc_by(stats.faults as u64);
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_else(|_| "Error encoding metrics".to_string())
    }
}
