pub(crate) mod config;
pub(crate) mod frame;
pub(crate) mod init;
pub(crate) mod ov2640;
pub(crate) mod sensor;

pub(crate) use config::{sensor_fallback_ladder, SensorConfig, SensorTuning, LADDER_LEN, SENSOR_PINS};
pub(crate) use frame::FrameSource;
pub(crate) use init::{apply_tuning, initialize};
pub(crate) use ov2640::{Ov2640, FRAME_BUF_LEN};
pub(crate) use sensor::{CaptureError, Sensor};
