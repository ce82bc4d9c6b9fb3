use esp_hal::{
    delay::Delay,
    dma::DmaRxStreamBuf,
    i2c::master::I2c,
    lcd_cam::cam::{Camera, Config as CamConfig},
    time::Rate,
    Blocking,
};
use esp_println::println;

use super::config::{BufferLocation, GrabPolicy, SensorConfig};
use super::sensor::{CaptureError, FrameInfo, PixelFormat, Sensor, SensorError, TuningParam};

/// Assembly buffer for one JPEG frame; sized for SVGA at the qualities the
/// ladder uses.
pub(crate) const FRAME_BUF_LEN: usize = 48 * 1024;

const SCCB_ADDR: u8 = 0x30;
const PID_OV2640: u8 = 0x26;

// Register bank select lives at 0xFF in both banks.
const REG_BANK_SEL: u8 = 0xFF;
const BANK_DSP: u8 = 0x00;
const BANK_SENSOR: u8 = 0x01;

// Sensor bank.
const REG_COM7: u8 = 0x12;
const COM7_SRST: u8 = 0x80;
const REG_CLKRC: u8 = 0x11;
const REG_PIDH: u8 = 0x0A;
const REG_PIDL: u8 = 0x0B;
const REG_COM10: u8 = 0x15;

// DSP bank.
const REG_R_BYPASS: u8 = 0x05;
const REG_QS: u8 = 0x44;
const REG_CTRL2: u8 = 0x86;
const REG_CTRL3: u8 = 0x87;
const REG_ZMOW: u8 = 0x5A;
const REG_ZMOH: u8 = 0x5B;
const REG_ZMHH: u8 = 0x5C;
const REG_R_DVP_SP: u8 = 0xD3;
const REG_IMAGE_MODE: u8 = 0xDA;
const IMAGE_MODE_JPEG: u8 = 0x10;
const IMAGE_MODE_RGB565: u8 = 0x09;
const REG_RESET: u8 = 0xE0;
const REG_BPADDR: u8 = 0x7C;
const REG_BPDATA: u8 = 0x7D;

// DSP-side baseline after soft reset; windowing and clock are programmed
// separately from the active SensorConfig.
const DSP_BASE_TABLE: &[(u8, u8)] = &[
    (REG_R_BYPASS, 0x00),
    (REG_CTRL2, 0x3D),
    (REG_CTRL3, 0x00),
    (REG_R_DVP_SP, 0x80), // auto DVP PCLK
    (REG_RESET, 0x00),
];

const JPEG_QUALITY_MIN: u8 = 2;
const JPEG_QUALITY_MAX: u8 = 60;

// Bounded wait while draining the DVP stream; past this the frame is
// declared not ready rather than hanging the capture path.
const CAPTURE_IDLE_SPINS_MAX: u32 = 200_000;

/// OV2640 on the DVP interface: SCCB control over I2C, pixel path through
/// the LCD_CAM peripheral into a DMA stream buffer.
pub(crate) struct Ov2640<'d> {
    sccb: I2c<'d, Blocking>,
    camera: Option<Camera<'d>>,
    dma_buf: Option<DmaRxStreamBuf>,
    frame_buf: &'static mut [u8; FRAME_BUF_LEN],
    frame_len: usize,
    in_flight: bool,
    sequence: u32,
    grab_policy: GrabPolicy,
    online: bool,
    delay: Delay,
}

impl<'d> Ov2640<'d> {
    pub(crate) fn new(
        sccb: I2c<'d, Blocking>,
        camera: Camera<'d>,
        dma_buf: DmaRxStreamBuf,
        frame_buf: &'static mut [u8; FRAME_BUF_LEN],
    ) -> Self {
        Self {
            sccb,
            camera: Some(camera),
            dma_buf: Some(dma_buf),
            frame_buf,
            frame_len: 0,
            in_flight: false,
            sequence: 0,
            grab_policy: GrabPolicy::WhenEmpty,
            online: false,
            delay: Delay::new(),
        }
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.sccb
            .write(SCCB_ADDR, &[reg, value])
            .map_err(|_| SensorError::Bus)
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, SensorError> {
        let mut value = [0u8; 1];
        self.sccb
            .write_read(SCCB_ADDR, &[reg], &mut value)
            .map_err(|_| SensorError::Bus)?;
        Ok(value[0])
    }

    fn select_bank(&mut self, bank: u8) -> Result<(), SensorError> {
        self.write_reg(REG_BANK_SEL, bank)
    }

    fn write_table(&mut self, table: &[(u8, u8)]) -> Result<(), SensorError> {
        for &(reg, value) in table {
            self.write_reg(reg, value)?;
        }
        Ok(())
    }

    fn probe(&mut self) -> Result<(), SensorError> {
        self.select_bank(BANK_SENSOR)?;
        let pid = self.read_reg(REG_PIDH)?;
        let ver = self.read_reg(REG_PIDL)?;
        if pid != PID_OV2640 {
            println!("camera: unexpected sensor id pid={:#04x} ver={:#04x}", pid, ver);
            return Err(SensorError::Probe);
        }
        Ok(())
    }

    fn soft_reset(&mut self) -> Result<(), SensorError> {
        self.select_bank(BANK_SENSOR)?;
        self.write_reg(REG_COM7, COM7_SRST)?;
        self.delay.delay_millis(5);
        Ok(())
    }

    fn program_output(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        let (width, height) = config.frame_size.dimensions();
        self.select_bank(BANK_DSP)?;
        self.write_table(DSP_BASE_TABLE)?;
        let mode = match config.pixel_format {
            PixelFormat::Jpeg => IMAGE_MODE_JPEG,
            PixelFormat::Rgb565 => IMAGE_MODE_RGB565,
        };
        self.write_reg(REG_IMAGE_MODE, mode)?;
        // Output window in units of four pixels; ZMHH carries the overflow
        // bits of both dimensions.
        let out_w = width / 4;
        let out_h = height / 4;
        self.write_reg(REG_ZMOW, (out_w & 0xFF) as u8)?;
        self.write_reg(REG_ZMOH, (out_h & 0xFF) as u8)?;
        self.write_reg(REG_ZMHH, (((out_w >> 8) & 0x03) | ((out_h >> 6) & 0x04)) as u8)?;
        self.write_reg(REG_QS, config.jpeg_quality.clamp(JPEG_QUALITY_MIN, JPEG_QUALITY_MAX))?;
        Ok(())
    }

    fn set_quality(&mut self, value: i8) -> Result<(), SensorError> {
        let quality = (value.max(0) as u8).clamp(JPEG_QUALITY_MIN, JPEG_QUALITY_MAX);
        self.select_bank(BANK_DSP)?;
        self.write_reg(REG_QS, quality)
    }

    fn set_contrast(&mut self, level: i8) -> Result<(), SensorError> {
        // SDE indirect registers; one (offset, gain) pair per step.
        const CONTRAST_STEPS: [(u8, u8); 5] = [
            (0x18, 0x34),
            (0x1C, 0x2A),
            (0x20, 0x20),
            (0x24, 0x16),
            (0x28, 0x0C),
        ];
        let index = (level.clamp(-2, 2) + 2) as usize;
        let (offset, gain) = CONTRAST_STEPS[index];
        self.select_bank(BANK_DSP)?;
        self.write_table(&[
            (REG_BPADDR, 0x00),
            (REG_BPDATA, 0x04),
            (REG_BPADDR, 0x07),
            (REG_BPDATA, 0x20),
            (REG_BPDATA, offset),
            (REG_BPDATA, gain),
            (REG_BPDATA, 0x06),
        ])
    }

    fn reconfigure_clock(&mut self, xclk_hz: u32) -> Result<(), SensorError> {
        let camera = self.camera.as_mut().ok_or(SensorError::Capture)?;
        let cam_config = CamConfig::default().with_frequency(Rate::from_hz(xclk_hz));
        camera
            .apply_config(&cam_config)
            .map_err(|_| SensorError::Capture)?;
        self.select_bank(BANK_SENSOR)?;
        // Keep the internal PLL off the edge at reduced master clocks.
        self.write_reg(REG_CLKRC, 0x01)?;
        self.write_reg(REG_COM10, 0x00)?;
        Ok(())
    }

    /// Pull one frame's worth of DVP bytes out of the stream buffer.
    fn capture_into_frame_buf(&mut self) -> Result<usize, CaptureError> {
        let Some(camera) = self.camera.take() else {
            return Err(CaptureError::NotReady);
        };
        let Some(dma_buf) = self.dma_buf.take() else {
            self.camera = Some(camera);
            return Err(CaptureError::NotReady);
        };

        let mut transfer = match camera.receive(dma_buf) {
            Ok(transfer) => transfer,
            Err((_err, camera, dma_buf)) => {
                self.camera = Some(camera);
                self.dma_buf = Some(dma_buf);
                return Err(CaptureError::NotReady);
            }
        };

        let mut len = 0usize;
        let mut idle_spins = 0u32;
        let mut complete = false;
        while len < self.frame_buf.len() && idle_spins < CAPTURE_IDLE_SPINS_MAX {
            let read = transfer.pop(&mut self.frame_buf[len..]);
            if read == 0 {
                idle_spins += 1;
                continue;
            }
            let scan_from = len.saturating_sub(1);
            len += read;
            idle_spins = 0;
            if jpeg_end(&self.frame_buf[scan_from..len]).is_some() {
                complete = true;
                break;
            }
        }

        let (camera, dma_buf) = transfer.stop();
        self.camera = Some(camera);
        self.dma_buf = Some(dma_buf);

        if complete || len > 0 {
            Ok(len)
        } else {
            Err(CaptureError::NotReady)
        }
    }
}

impl Sensor for Ov2640<'_> {
    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        self.online = false;
        self.probe()?;
        self.soft_reset()?;
        self.reconfigure_clock(config.xclk_hz)?;
        self.program_output(config)?;
        if config.buffer_location == BufferLocation::Psram {
            // This board assembles frames in internal RAM regardless.
            println!("camera: psram frame buffers unavailable; using dram");
        }
        self.grab_policy = config.grab_policy;
        println!(
            "camera: configured {} buffers={} quality={} grab={}",
            config.frame_size.as_str(),
            config.frame_buffers,
            config.jpeg_quality,
            self.grab_policy.as_str()
        );
        self.online = true;
        Ok(())
    }

    fn deinit(&mut self) {
        if self.online {
            let _ = self.soft_reset();
        }
        self.in_flight = false;
        self.frame_len = 0;
        self.online = false;
    }

    fn acquire_frame(&mut self) -> Result<FrameInfo, CaptureError> {
        if !self.online || self.in_flight {
            return Err(CaptureError::NotReady);
        }
        let raw_len = self.capture_into_frame_buf()?;

        // The stream may start mid-frame; present only a complete SOI..EOI
        // span. Anything else is handed out as an empty frame for the
        // caller's validity check to discard.
        self.in_flight = true;
        self.sequence = self.sequence.wrapping_add(1);
        match jpeg_span(&self.frame_buf[..raw_len]) {
            Some((start, end)) => {
                self.frame_buf.copy_within(start..end, 0);
                self.frame_len = end - start;
                Ok(FrameInfo {
                    len: self.frame_len,
                    format: PixelFormat::Jpeg,
                    sequence: self.sequence,
                })
            }
            None => {
                self.frame_len = 0;
                Ok(FrameInfo {
                    len: 0,
                    format: PixelFormat::Jpeg,
                    sequence: self.sequence,
                })
            }
        }
    }

    fn frame_bytes(&self) -> &[u8] {
        &self.frame_buf[..self.frame_len]
    }

    fn release_frame(&mut self) {
        self.in_flight = false;
        self.frame_len = 0;
    }

    fn set_param(&mut self, param: TuningParam, value: i8) -> bool {
        if !self.online {
            return false;
        }
        let result = match param {
            TuningParam::JpegQuality => self.set_quality(value),
            TuningParam::Contrast => self.set_contrast(value),
        };
        result.is_ok()
    }
}

fn jpeg_span(bytes: &[u8]) -> Option<(usize, usize)> {
    let start = find_marker(bytes, 0xD8)?;
    let end = find_marker(&bytes[start..], 0xD9)?;
    Some((start, start + end + 2))
}

fn jpeg_end(bytes: &[u8]) -> Option<usize> {
    find_marker(bytes, 0xD9)
}

fn find_marker(bytes: &[u8], second: u8) -> Option<usize> {
    bytes
        .windows(2)
        .position(|window| window == [0xFF, second])
}
