//! 遥控按键到速度指令的混合策略。
//!
//! 纯函数，无 I/O：给定当前按下的方向键集合与固定参数，计算 `Twist`。
//! - 前进优先于后退 (两者同时按下时按前进处理)。
//! - 左转优先于右转。
//! - 行进中转向时线速度乘以衰减系数，角速度替换为较小的行进转向角速度。

use common_models::robot_models::Twist;
use std::collections::BTreeSet;

use crate::config::ControlConfig;

/// 方向键。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    /// 将浏览器 `KeyboardEvent.key` 映射为方向，非方向键返回 `None`。
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Direction::Forward),
            "ArrowDown" => Some(Direction::Backward),
            "ArrowLeft" => Some(Direction::Left),
            "ArrowRight" => Some(Direction::Right),
            _ => None,
        }
    }
}

/// 混合参数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerPolicy {
    pub base_linear: f64,
    pub base_angular: f64,
    pub diagonal_angular: f64,
    pub diagonal_damping: f64,
}

impl Default for MixerPolicy {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}

impl From<&ControlConfig> for MixerPolicy {
    fn from(config: &ControlConfig) -> Self {
        Self {
            base_linear: config.base_linear,
            base_angular: config.base_angular,
            diagonal_angular: config.diagonal_angular,
            diagonal_damping: config.diagonal_damping,
        }
    }
}

/// 一个遥控会话中当前处于按下状态的按键。
///
/// 保存原始按键名 (包括非方向键)，以便在应答中原样回显；
/// 有序集合保证 `pressed_keys` 的输出顺序稳定。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    held: BTreeSet<String>,
}

impl KeyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: &str) {
        self.held.insert(key.to_string());
    }

    pub fn release(&mut self, key: &str) {
        self.held.remove(key);
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn pressed_keys(&self) -> Vec<String> {
        self.held.iter().cloned().collect()
    }

    /// 当前按下的方向键集合。
    pub fn directions(&self) -> BTreeSet<Direction> {
        self.held.iter().filter_map(|key| Direction::from_key(key)).collect()
    }
}

/// 根据按下的方向键计算速度指令。
pub fn mix(held: &BTreeSet<Direction>, policy: &MixerPolicy) -> Twist {
    let mut linear = if held.contains(&Direction::Forward) {
        policy.base_linear
    } else if held.contains(&Direction::Backward) {
        -policy.base_linear
    } else {
        0.0
    };

    let turn_sign = if held.contains(&Direction::Left) {
        1.0
    } else if held.contains(&Direction::Right) {
        -1.0
    } else {
        0.0
    };

    let mut angular = turn_sign * policy.base_angular;
    if turn_sign != 0.0 && linear != 0.0 {
        linear *= policy.diagonal_damping;
        angular = turn_sign * policy.diagonal_angular;
    }

    Twist::planar(linear, angular)
}
