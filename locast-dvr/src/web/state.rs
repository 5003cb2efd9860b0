//! Web server shared state.

use std::sync::Arc;
use std::time::Duration;

use locast_dvr_lineup::DeviceIdentity;

use crate::config::Config;
use crate::transcoder::ProcessRunner;
use crate::tuner::TunerAdmission;
use crate::upstream::StationSource;

/// State shared by all handlers of one tuner instance.
pub struct DvrState {
    pub identity: DeviceIdentity,
    pub source: Arc<dyn StationSource>,
    pub admission: Arc<TunerAdmission>,
    pub runner: ProcessRunner,
    /// Configuration with the password already redacted.
    pub config: Config,
    /// Whether this instance serves several locations.
    pub multiplex: bool,
    pub chunk_size: usize,
    pub verbose: bool,
    pub upstream_timeout: Duration,
}

impl DvrState {
    /// Build the state for one instance. The admission capacity follows
    /// the identity's tuner count.
    pub fn new(
        identity: DeviceIdentity,
        source: Arc<dyn StationSource>,
        config: &Config,
        multiplex: bool,
    ) -> Self {
        let runner = ProcessRunner::new(
            config.ffmpeg.clone(),
            Duration::from_millis(config.launch_grace_ms),
            Duration::from_millis(config.stop_timeout_ms),
        );
        Self {
            admission: TunerAdmission::new(identity.tuner_count),
            identity,
            source,
            runner,
            config: config.redacted(),
            multiplex,
            chunk_size: config.bytes_per_read,
            verbose: config.verbose > 0,
            upstream_timeout: Duration::from_secs(config.upstream_timeout_secs),
        }
    }

    pub fn base_url(&self) -> String {
        self.identity.base_url()
    }
}
