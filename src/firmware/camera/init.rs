use embassy_time::{Duration, Timer};
use esp_println::println;

use super::super::config::InitPolicy;
use super::super::retry::{RetryBudget, RetryVerdict};
use super::super::telemetry;
use super::config::{SensorConfig, SensorTuning};
use super::sensor::{Sensor, TuningParam};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InitError {
    /// Every ladder rung was exhausted. A half-initialized sensor driver has
    /// no safe partial state; the caller must restart the device.
    Exhausted { attempts: u32 },
}

impl InitError {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Exhausted { .. } => "sensor bring-up exhausted",
        }
    }
}

/// Attempt sequencing over the configuration ladder: every rung gets a full
/// retry budget before the next, worse, rung is tried.
pub(crate) struct InitLadder {
    rungs: usize,
    rung: usize,
    budget: RetryBudget,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LadderStep {
    RetryRung { delay: Duration },
    NextRung { delay: Duration },
    Exhausted,
}

impl InitLadder {
    pub(crate) fn new(rungs: usize, attempts_per_rung: u8, delay: Duration) -> Self {
        Self {
            rungs,
            rung: 0,
            budget: RetryBudget::new(attempts_per_rung.max(1), delay),
        }
    }

    pub(crate) fn current_rung(&self) -> Option<usize> {
        (self.rung < self.rungs).then_some(self.rung)
    }

    pub(crate) fn record_failure(&mut self) -> LadderStep {
        match self.budget.record_failure() {
            RetryVerdict::Retry { delay } => LadderStep::RetryRung { delay },
            RetryVerdict::Exhausted => {
                self.rung += 1;
                if self.rung >= self.rungs {
                    LadderStep::Exhausted
                } else {
                    let delay = self.budget.delay();
                    self.budget.reset();
                    LadderStep::NextRung { delay }
                }
            }
        }
    }
}

/// Walk the fallback ladder until one configuration comes up or the whole
/// ladder is spent. The driver is de-initialized before every attempt;
/// bring-up from a half-configured sensor is not reliable.
pub(crate) async fn initialize<S: Sensor>(
    sensor: &mut S,
    ladder: &[SensorConfig],
    policy: InitPolicy,
) -> Result<SensorConfig, InitError> {
    let mut sequencer = InitLadder::new(ladder.len(), policy.attempts_per_config, policy.retry_delay);
    let mut attempts: u32 = 0;

    loop {
        let Some(rung) = sequencer.current_rung() else {
            return Err(InitError::Exhausted { attempts });
        };
        let config = ladder[rung];
        attempts += 1;
        telemetry::record_camera_init_attempt();
        sensor.deinit();
        match sensor.init(&config) {
            Ok(()) => {
                println!(
                    "camera: sensor up {} xclk={}Hz attempt={}",
                    config.frame_size.as_str(),
                    config.xclk_hz,
                    attempts
                );
                return Ok(config);
            }
            Err(err) => {
                println!(
                    "camera: init err={:?} rung={} attempt={}",
                    err, rung, attempts
                );
                match sequencer.record_failure() {
                    LadderStep::RetryRung { delay } => pause(delay).await,
                    LadderStep::NextRung { delay } => {
                        telemetry::record_camera_init_fallback();
                        println!("camera: falling back to next sensor config");
                        pause(delay).await;
                    }
                    LadderStep::Exhausted => {}
                }
            }
        }
    }
}

/// Best-effort post-init calibration; a rejected parameter is reported and
/// skipped, never fatal.
pub(crate) fn apply_tuning<S: Sensor>(sensor: &mut S, tuning: &SensorTuning) {
    let requests = [
        (TuningParam::JpegQuality, tuning.jpeg_quality),
        (TuningParam::Contrast, tuning.contrast),
    ];
    for (param, value) in requests {
        if !sensor.set_param(param, value) {
            telemetry::record_camera_tuning_reject();
            println!("camera: tuning {}={} rejected", param.as_str(), value);
        }
    }
}

async fn pause(delay: Duration) {
    if delay.as_ticks() != 0 {
        Timer::after(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::super::config::sensor_fallback_ladder;
    use super::super::sensor::{CaptureError, FrameInfo, SensorError};
    use super::*;

    struct LadderSensor {
        /// Rung index that succeeds; everything before it always fails.
        good_rung: usize,
        ladder: [SensorConfig; 3],
        init_calls: u32,
        deinit_calls: u32,
    }

    impl LadderSensor {
        fn new(good_rung: usize) -> Self {
            Self {
                good_rung,
                ladder: sensor_fallback_ladder(),
                init_calls: 0,
                deinit_calls: 0,
            }
        }
    }

    impl Sensor for LadderSensor {
        fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
            self.init_calls += 1;
            if *config == self.ladder[self.good_rung] {
                Ok(())
            } else {
                Err(SensorError::Probe)
            }
        }

        fn deinit(&mut self) {
            self.deinit_calls += 1;
        }

        fn acquire_frame(&mut self) -> Result<FrameInfo, CaptureError> {
            Err(CaptureError::NotReady)
        }

        fn frame_bytes(&self) -> &[u8] {
            &[]
        }

        fn release_frame(&mut self) {}

        fn set_param(&mut self, _param: TuningParam, _value: i8) -> bool {
            true
        }
    }

    fn zero_delay_policy(attempts_per_config: u8) -> InitPolicy {
        InitPolicy {
            attempts_per_config,
            retry_delay: Duration::from_ticks(0),
            settle_delay: Duration::from_ticks(0),
        }
    }

    #[test]
    fn last_rung_succeeding_costs_full_budget_of_earlier_rungs() {
        // K = 3 rungs, M = 2 attempts each, only the last rung works:
        // exactly (K - 1) * M + 1 init calls.
        let mut sensor = LadderSensor::new(2);
        let ladder = sensor_fallback_ladder();
        let result = embassy_futures::block_on(initialize(
            &mut sensor,
            &ladder,
            zero_delay_policy(2),
        ));
        assert_eq!(result, Ok(ladder[2]));
        assert_eq!(sensor.init_calls, 5);
        assert_eq!(sensor.deinit_calls, 5);
    }

    #[test]
    fn first_rung_success_makes_one_call() {
        let mut sensor = LadderSensor::new(0);
        let ladder = sensor_fallback_ladder();
        let result = embassy_futures::block_on(initialize(
            &mut sensor,
            &ladder,
            zero_delay_policy(3),
        ));
        assert_eq!(result, Ok(ladder[0]));
        assert_eq!(sensor.init_calls, 1);
    }

    #[test]
    fn exhausted_ladder_reports_total_attempts() {
        struct NeverUp;
        impl Sensor for NeverUp {
            fn init(&mut self, _config: &SensorConfig) -> Result<(), SensorError> {
                Err(SensorError::Bus)
            }
            fn deinit(&mut self) {}
            fn acquire_frame(&mut self) -> Result<FrameInfo, CaptureError> {
                Err(CaptureError::NotReady)
            }
            fn frame_bytes(&self) -> &[u8] {
                &[]
            }
            fn release_frame(&mut self) {}
            fn set_param(&mut self, _param: TuningParam, _value: i8) -> bool {
                false
            }
        }

        let ladder = sensor_fallback_ladder();
        let result = embassy_futures::block_on(initialize(
            &mut NeverUp,
            &ladder,
            zero_delay_policy(2),
        ));
        assert_eq!(result, Err(InitError::Exhausted { attempts: 6 }));
    }

    #[test]
    fn ladder_sequencing_moves_rung_only_after_budget() {
        let mut sequencer = InitLadder::new(2, 2, Duration::from_ticks(0));
        assert_eq!(sequencer.current_rung(), Some(0));
        assert!(matches!(
            sequencer.record_failure(),
            LadderStep::RetryRung { .. }
        ));
        assert_eq!(sequencer.current_rung(), Some(0));
        assert!(matches!(
            sequencer.record_failure(),
            LadderStep::NextRung { .. }
        ));
        assert_eq!(sequencer.current_rung(), Some(1));
        let _ = sequencer.record_failure();
        assert_eq!(sequencer.record_failure(), LadderStep::Exhausted);
        assert_eq!(sequencer.current_rung(), None);
    }

    #[test]
    fn tuning_rejection_does_not_panic_or_abort() {
        struct RejectsAll;
        impl Sensor for RejectsAll {
            fn init(&mut self, _config: &SensorConfig) -> Result<(), SensorError> {
                Ok(())
            }
            fn deinit(&mut self) {}
            fn acquire_frame(&mut self) -> Result<FrameInfo, CaptureError> {
                Err(CaptureError::NotReady)
            }
            fn frame_bytes(&self) -> &[u8] {
                &[]
            }
            fn release_frame(&mut self) {}
            fn set_param(&mut self, _param: TuningParam, _value: i8) -> bool {
                false
            }
        }

        apply_tuning(&mut RejectsAll, &SensorTuning::defaults());
    }
}
