use super::{CameraError, CameraProvider, FrameSource, RgbFrame};

/// 合成摄像头：每帧渲染一幅随帧号平移的彩色渐变，并在画面上叠加一条移动的扫描线。
pub struct SyntheticCameraProvider {
    width: u32,
    height: u32,
}

impl SyntheticCameraProvider {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

impl CameraProvider for SyntheticCameraProvider {
    fn open(&self, _robot_id: &str) -> Result<Box<dyn FrameSource>, CameraError> {
        Ok(Box::new(SyntheticCamera {
            width: self.width,
            height: self.height,
            tick: 0,
        }))
    }
}

struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u32,
}

impl FrameSource for SyntheticCamera {
    fn read_frame(&mut self) -> Result<RgbFrame, CameraError> {
        let (width, height) = (self.width, self.height);
        let shift = self.tick % width;
        let scan_row = self.tick % height;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
        for y in 0..height {
            for x in 0..width {
                if y == scan_row {
                    pixels.extend_from_slice(&[255, 255, 255]);
                    continue;
                }
                let r = (((x + shift) % width) * 255 / width) as u8;
                let g = (y * 255 / height) as u8;
                let b = (((x + y + shift) / 4) % 256) as u8;
                pixels.extend_from_slice(&[r, g, b]);
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(RgbFrame { width, height, pixels })
    }
}

/// 无可用设备的后端：所有打开请求都失败。
pub struct DisabledCameraProvider;

impl CameraProvider for DisabledCameraProvider {
    fn open(&self, robot_id: &str) -> Result<Box<dyn FrameSource>, CameraError> {
        Err(CameraError::NoDevice(format!("机器人 {} 未配置摄像头", robot_id)))
    }
}
