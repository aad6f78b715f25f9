//! 执行器组
//!
//! 按执行器 ID 注册 [`MoveExecutor`]，把上游总线送来的 [`MoveRequest`] 分发给对应执行器。

use crate::control::{MoveExecutor, MoveKind, MoveMode};
use crate::error::ClientError;
use crossbeam_channel::Receiver;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 上游总线的运动请求
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MoveRequest {
    pub actuator: u8,
    pub kind: MoveKind,
    pub percent: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub mode: MoveMode,
}

impl MoveRequest {
    pub fn absolute(actuator: u8, percent: f64) -> Self {
        Self {
            actuator,
            kind: MoveKind::Absolute,
            percent,
            mode: MoveMode::Clamp,
        }
    }

    pub fn relative(actuator: u8, percent: f64) -> Self {
        Self {
            actuator,
            kind: MoveKind::Relative,
            percent,
            mode: MoveMode::Clamp,
        }
    }

    pub fn strict(mut self) -> Self {
        self.mode = MoveMode::Strict;
        self
    }
}

/// 按 ID 索引的执行器集合
#[derive(Debug, Default)]
pub struct ActuatorBank {
    executors: BTreeMap<u8, Arc<MoveExecutor>>,
}

impl ActuatorBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册执行器
    ///
    /// # 错误
    /// ID 已被占用时返回 `ClientError::InvalidConfig`。
    pub fn insert(&mut self, executor: MoveExecutor) -> Result<Arc<MoveExecutor>, ClientError> {
        let id = executor.config().id;
        if let Some(existing) = self.executors.get(&id) {
            return Err(ClientError::InvalidConfig(format!(
                "actuator id {} already used by '{}'",
                id,
                existing.config().name
            )));
        }
        let executor = Arc::new(executor);
        self.executors.insert(id, executor.clone());
        debug!("Registered actuator {} '{}'", id, executor.config().name);
        Ok(executor)
    }

    pub fn get(&self, id: u8) -> Option<&Arc<MoveExecutor>> {
        self.executors.get(&id)
    }

    /// 按名称查找
    pub fn find(&self, name: &str) -> Option<&Arc<MoveExecutor>> {
        self.executors.values().find(|e| e.config().name == name)
    }

    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.executors.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<MoveExecutor>> {
        self.executors.values()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// 分发一条运动请求
    pub fn dispatch(&self, request: &MoveRequest) -> Result<(), ClientError> {
        let executor = self
            .get(request.actuator)
            .ok_or(ClientError::UnknownActuator(request.actuator))?;
        executor.start(request.kind, request.percent, request.mode)
    }

    /// 持续分发请求直到通道关闭
    ///
    /// 单条请求失败只记录日志（执行器已发布错误事件），不中断循环。
    pub fn serve(&self, requests: &Receiver<MoveRequest>) {
        info!("Actuator bank serving {} actuators", self.len());
        for request in requests.iter() {
            if let Err(e) = self.dispatch(&request) {
                warn!("Move request {:?} failed: {}", request, e);
            }
        }
        debug!("Move request channel closed");
    }

    /// 全部回到起始位置
    ///
    /// 逐个尝试，返回第一个错误。
    pub fn reset_all(&self) -> Result<(), ClientError> {
        let mut first_error = None;
        for executor in self.executors.values() {
            if let Err(e) = executor.reset() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn stop_all(&self) {
        for executor in self.executors.values() {
            executor.stop();
        }
    }

    /// 等待全部执行器空闲
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.executors
            .values()
            .all(|e| e.wait_idle(deadline.saturating_duration_since(Instant::now())))
    }
}
