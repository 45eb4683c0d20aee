use std::sync::OnceLock;
use std::time::Instant;

fn timings_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("VEENDOR_TIMINGS")
            .ok()
            .map(|raw| {
                let value = raw.trim();
                !value.is_empty()
                    && !matches!(
                        value.to_ascii_lowercase().as_str(),
                        "0" | "false" | "no" | "off"
                    )
            })
            .unwrap_or(false)
    })
}

/// Logs how long an install phase took when `VEENDOR_TIMINGS` is set.
pub(crate) struct TimingGuard {
    phase: &'static str,
    start: Instant,
}

impl TimingGuard {
    pub(crate) fn new(phase: &'static str) -> Option<Self> {
        timings_enabled().then(|| Self {
            phase,
            start: Instant::now(),
        })
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        tracing::info!(
            veendor_phase = self.phase,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "timing"
        );
    }
}
