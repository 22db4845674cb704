use bytes::Bytes;

/// A decoded frame in packed RGB24, as handed over by the decoder after
/// pixel-format conversion.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    data: Bytes,
}

impl RgbFrame {
    pub fn new(width: u32, height: u32, data: Bytes) -> anyhow::Result<Self> {
        let expect = width as usize * height as usize * 3;
        if data.len() != expect {
            anyhow::bail!(
                "rgb frame buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expect,
                width,
                height
            );
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
