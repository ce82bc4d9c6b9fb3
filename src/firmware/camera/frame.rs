use super::sensor::{CaptureError, FrameInfo, PixelFormat, Sensor};

/// Producer side of the frame-buffer protocol. The underlying driver pool
/// is tiny (one or two buffers), so a frame held too long stalls capture;
/// `FrameGuard` keeps the checkout window scoped and gives the buffer back
/// on every exit path.
pub(crate) struct FrameSource<S: Sensor> {
    sensor: S,
}

impl<S: Sensor> FrameSource<S> {
    pub(crate) fn new(sensor: S) -> Self {
        Self { sensor }
    }

    #[cfg(test)]
    pub(crate) fn sensor_ref(&self) -> &S {
        &self.sensor
    }

    /// Check a frame out of the driver pool. The guard mutably borrows the
    /// source, so a second in-flight frame on the same path cannot exist.
    pub(crate) fn acquire(&mut self) -> Result<FrameGuard<'_, S>, CaptureError> {
        let info = self.sensor.acquire_frame()?;
        if info.len == 0 || info.format != PixelFormat::Jpeg {
            // Transient driver artifact; give the buffer straight back so
            // the pool is not starved, and never forward it.
            self.sensor.release_frame();
            return Err(CaptureError::Invalid);
        }
        Ok(FrameGuard {
            sensor: &mut self.sensor,
            info,
        })
    }
}

pub(crate) struct FrameGuard<'a, S: Sensor> {
    sensor: &'a mut S,
    info: FrameInfo,
}

impl<S: Sensor> FrameGuard<'_, S> {
    pub(crate) fn bytes(&self) -> &[u8] {
        self.sensor.frame_bytes()
    }

    pub(crate) fn len(&self) -> usize {
        self.info.len
    }
}

impl<S: Sensor> Drop for FrameGuard<'_, S> {
    fn drop(&mut self) {
        self.sensor.release_frame();
    }
}
