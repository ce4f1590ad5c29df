//! Permission-gated and hardware probes.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::collection::core::{Reading, keys};
use crate::config::ProbeBudgets;
use crate::environment::{BrowserEnvironment, MediaDeviceKind};

use super::SuspendingProbe;

/// Whether a position request is granted. The host prompt has its own timeout,
/// nested inside the probe budget.
#[derive(Debug, Clone, Copy)]
pub struct GeolocationProbe {
    prompt_timeout: Duration,
}

impl GeolocationProbe {
    pub fn new(prompt_timeout: Duration) -> Self {
        Self { prompt_timeout }
    }
}

impl Default for GeolocationProbe {
    fn default() -> Self {
        Self::new(ProbeBudgets::default().geolocation_prompt())
    }
}

#[async_trait]
impl SuspendingProbe for GeolocationProbe {
    fn name(&self) -> &'static str {
        keys::GEOLOCATION
    }

    fn key(&self) -> &'static str {
        keys::GEOLOCATION
    }

    fn budget(&self, budgets: &ProbeBudgets) -> Duration {
        budgets.geolocation()
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        env.request_geolocation(self.prompt_timeout)
            .await
            .map(|()| "granted")
            .into()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatteryProbe;

#[async_trait]
impl SuspendingProbe for BatteryProbe {
    fn name(&self) -> &'static str {
        keys::BATTERY
    }

    fn key(&self) -> &'static str {
        keys::BATTERY
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        env.battery()
            .await
            .map(|status| format!("available (charging: {})", status.charging))
            .into()
    }
}

/// Counts of enumerated media devices per kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaDevicesProbe;

#[async_trait]
impl SuspendingProbe for MediaDevicesProbe {
    fn name(&self) -> &'static str {
        keys::MEDIA_DEVICES
    }

    fn key(&self) -> &'static str {
        keys::MEDIA_DEVICES
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        env.media_devices()
            .await
            .map(|devices| {
                let count = |kind| devices.iter().filter(|d| **d == kind).count();
                format!(
                    "microphones: {}, speakers: {}, cameras: {}",
                    count(MediaDeviceKind::AudioInput),
                    count(MediaDeviceKind::AudioOutput),
                    count(MediaDeviceKind::VideoInput)
                )
            })
            .into()
    }
}

/// Number of speech synthesis voices, read after the list had time to load.
#[derive(Debug, Clone, Copy)]
pub struct SpeechVoicesProbe {
    settle: Duration,
}

impl SpeechVoicesProbe {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }
}

impl Default for SpeechVoicesProbe {
    fn default() -> Self {
        Self::new(ProbeBudgets::default().speech_settle())
    }
}

#[async_trait]
impl SuspendingProbe for SpeechVoicesProbe {
    fn name(&self) -> &'static str {
        keys::SPEECH_VOICES
    }

    fn key(&self) -> &'static str {
        keys::SPEECH_VOICES
    }

    async fn read(&self, env: &dyn BrowserEnvironment) -> Reading {
        tokio::time::sleep(self.settle).await;
        env.speech_voice_count()
            .map(|count| i64::try_from(count).unwrap_or(i64::MAX))
            .into()
    }
}

/// Wall time of a fixed floating point workload, in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct CpuTimingProbe {
    iterations: u32,
}

impl CpuTimingProbe {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for CpuTimingProbe {
    fn default() -> Self {
        Self::new(2_000_000)
    }
}

#[async_trait]
impl SuspendingProbe for CpuTimingProbe {
    fn name(&self) -> &'static str {
        keys::CPU_TIMING
    }

    fn key(&self) -> &'static str {
        keys::CPU_TIMING
    }

    async fn read(&self, _env: &dyn BrowserEnvironment) -> Reading {
        // Runs after the other suspending probes had a chance to start.
        tokio::task::yield_now().await;

        let started = Instant::now();
        let mut acc = 0.0_f64;
        for i in 0..self.iterations {
            acc += f64::from(i).sin().sqrt();
        }
        std::hint::black_box(acc);
        let elapsed = started.elapsed().as_secs_f64() * 1_000.0;
        Reading::value(format!("{elapsed:.2}"))
    }
}
