//! Move Executor - 单个执行器的运动状态机
//!
//! 把百分比运动请求变为原始位置步进序列并按保持时间逐步下发。
//!
//! # 线程模型
//!
//! - 调用者线程：换算、校验、规划，并同步下发第 0 步
//! - 工作线程：按每步保持时间（可取消的定时接收）下发后续步骤，结束后置为 `Idle`
//!
//! # 抢占
//!
//! 新请求在分发闸门（`gate`）内递增代数后才下发自己的第 0 步；
//! 工作线程在同一闸门内核对代数后才下发下一步。
//! 因此新请求开始下发后，旧轨迹的任何一步都不会再被下发。

use crate::actuator::ActuatorConfig;
use crate::control::planner::{Trajectory, TrajectoryPlanner, TrajectoryStep};
use crate::error::ClientError;
use crate::events::{ActuatorEvent, EventSink};
use crate::sink::PositionSink;
use botlink_driver::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// 越界处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MoveMode {
    /// 目标被限制到量程内（safe）
    #[default]
    Clamp,
    /// 越界请求被拒绝（unsafe）
    Strict,
}

/// 绝对/相对运动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum MoveKind {
    Absolute,
    Relative,
}

/// 执行器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MoveState {
    Idle = 0,
    Moving = 1,
}

impl MoveState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MoveState::Moving,
            _ => MoveState::Idle,
        }
    }
}

/// 分发闸门保护的数据
struct Gate {
    generation: u64,
}

struct Shared {
    config: ActuatorConfig,
    planner: TrajectoryPlanner,
    sink: Box<dyn PositionSink>,
    events: Arc<dyn EventSink>,
    gate: Mutex<Gate>,
    idle: Condvar,
    state: AtomicU8,
    /// 最后一次下发的位置（只在闸门内写入）
    current_raw: AtomicI32,
    /// 最后一次请求的目标
    target_raw: AtomicI32,
}

impl Shared {
    fn state(&self) -> MoveState {
        MoveState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// 调用者需持有闸门
    fn set_state(&self, state: MoveState) {
        self.state.store(state as u8, Ordering::Release);
        if state == MoveState::Idle {
            self.idle.notify_all();
        }
    }

    fn report(&self, err: &ClientError) {
        error!("Actuator '{}' (id {}): {}", self.config.name, self.config.id, err);
        self.events.publish(ActuatorEvent::Error {
            actuator: self.config.id,
            message: err.to_string(),
        });
    }

    /// 运动中止：未到达的目标作废，相对运动从最后下发的位置继续
    ///
    /// 调用者需持有闸门
    fn abort(&self, err: &ClientError) {
        self.target_raw
            .store(self.current_raw.load(Ordering::Acquire), Ordering::Release);
        self.set_state(MoveState::Idle);
        self.report(err);
    }

    /// 保持时间结束：下发下一步或完成运动
    ///
    /// 返回 `true` 表示轨迹仍在进行。
    fn advance(&self, plan: &mut ActivePlan) -> bool {
        let _gate = {
            let gate = self.gate.lock();
            if gate.generation != plan.generation {
                trace!("Actuator {} dropped superseded trajectory", self.config.id);
                return false;
            }
            gate
        };

        let Some(step) = plan.steps.pop_front() else {
            self.complete();
            return false;
        };

        if let Err(e) = self.sink.dispatch(&self.config, step.position) {
            self.abort(&e);
            return false;
        }
        self.current_raw.store(step.position, Ordering::Release);
        plan.hold = step.hold;
        true
    }

    /// 调用者需持有闸门
    fn complete(&self) {
        let position = self.current_raw.load(Ordering::Acquire);
        self.set_state(MoveState::Idle);
        debug!("Actuator {} settled at {}", self.config.id, position);

        self.events.publish(ActuatorEvent::MoveCompleted {
            actuator: self.config.id,
            position,
        });
        if self.config.power_gated && position == self.config.home_raw() {
            self.events.publish(ActuatorEvent::PowerRelease {
                actuator: self.config.id,
            });
        }
    }
}

/// 交给工作线程的剩余轨迹
struct ActivePlan {
    generation: u64,
    steps: VecDeque<TrajectoryStep>,
    /// 距离下一步的保持时间
    hold: Duration,
}

enum Job {
    Run(ActivePlan),
    Cancel,
    Shutdown,
}

fn worker_loop(shared: Arc<Shared>, jobs: Receiver<Job>) {
    let mut active: Option<ActivePlan> = None;

    loop {
        let job = match &active {
            None => match jobs.recv() {
                Ok(job) => Some(job),
                Err(_) => break,
            },
            Some(plan) => match jobs.recv_timeout(plan.hold) {
                Ok(job) => Some(job),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        match job {
            Some(Job::Run(plan)) => active = Some(plan),
            Some(Job::Cancel) => active = None,
            Some(Job::Shutdown) => break,
            None => {
                active = active
                    .take()
                    .and_then(|mut plan| shared.advance(&mut plan).then_some(plan));
            },
        }
    }

    trace!("Actuator {} worker exiting", shared.config.id);
}

/// 单个执行器的运动执行器
///
/// # 示例
///
/// ```rust
/// use botlink_client::prelude::*;
/// use std::sync::Arc;
///
/// struct Printer;
/// impl PositionSink for Printer {
///     fn dispatch(&self, actuator: &ActuatorConfig, raw: i32) -> Result<(), ClientError> {
///         println!("{} -> {}", actuator.name, raw);
///         Ok(())
///     }
/// }
///
/// let config = ActuatorConfig::new(0, "pan", 0, 200);
/// let executor = MoveExecutor::new(config, Printer, Arc::new(NullEventSink)).unwrap();
/// executor.move_absolute(10.0, MoveMode::Clamp).unwrap();
/// assert_eq!(executor.current_raw(), 20);
/// ```
pub struct MoveExecutor {
    shared: Arc<Shared>,
    jobs: Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MoveExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveExecutor")
            .field("actuator", &self.shared.config.name)
            .field("state", &self.state())
            .field("current_raw", &self.current_raw())
            .field("target_raw", &self.target_raw())
            .finish()
    }
}

impl MoveExecutor {
    /// 使用默认规划器创建执行器
    ///
    /// 初始位置视为起始位置（不下发）。
    pub fn new(
        config: ActuatorConfig,
        sink: impl PositionSink + 'static,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ClientError> {
        Self::with_planner(config, TrajectoryPlanner::default(), sink, events)
    }

    pub fn with_planner(
        config: ActuatorConfig,
        planner: TrajectoryPlanner,
        sink: impl PositionSink + 'static,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let home = config.home_raw();
        let name = format!("botlink-{}", config.name);
        let shared = Arc::new(Shared {
            config,
            planner,
            sink: Box::new(sink),
            events,
            gate: Mutex::new(Gate { generation: 0 }),
            idle: Condvar::new(),
            state: AtomicU8::new(MoveState::Idle as u8),
            current_raw: AtomicI32::new(home),
            target_raw: AtomicI32::new(home),
        });

        let (jobs, job_rx) = unbounded();
        let worker = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(shared, job_rx))
                .map_err(|e| DriverError::IoThread(e.to_string()))?
        };

        Ok(Self {
            shared,
            jobs,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 移动到绝对百分比位置
    pub fn move_absolute(&self, percent: f64, mode: MoveMode) -> Result<(), ClientError> {
        self.start(MoveKind::Absolute, percent, mode)
    }

    /// 在当前目标基础上移动一个百分比
    pub fn move_relative(&self, percent: f64, mode: MoveMode) -> Result<(), ClientError> {
        self.start(MoveKind::Relative, percent, mode)
    }

    /// 回到起始位置
    pub fn reset(&self) -> Result<(), ClientError> {
        self.move_absolute(self.shared.config.start_percent, MoveMode::Clamp)
    }

    /// 执行一次运动请求
    pub fn start(&self, kind: MoveKind, percent: f64, mode: MoveMode) -> Result<(), ClientError> {
        let shared = &*self.shared;
        let mut gate = shared.gate.lock();

        let (target, trajectory) = match self.prepare(kind, percent, mode) {
            Ok(prepared) => prepared,
            Err(e) => {
                shared.report(&e);
                return Err(e);
            },
        };

        gate.generation = gate.generation.wrapping_add(1);
        let generation = gate.generation;
        shared.target_raw.store(target, Ordering::Release);
        debug!(
            "Actuator {} {:?} {}% -> {} ({} steps)",
            shared.config.id,
            kind,
            percent,
            target,
            trajectory.len()
        );

        if shared.config.power_gated {
            shared.events.publish(ActuatorEvent::PowerAcquire {
                actuator: shared.config.id,
            });
        }

        let (first, steps) = trajectory.split_first();
        if let Err(e) = shared.sink.dispatch(&shared.config, first.position) {
            shared.abort(&e);
            return Err(e);
        }
        shared.current_raw.store(first.position, Ordering::Release);
        shared.set_state(MoveState::Moving);

        let plan = ActivePlan {
            generation,
            steps,
            hold: first.hold,
        };
        if self.jobs.send(Job::Run(plan)).is_err() {
            let e = ClientError::ExecutorStopped;
            shared.abort(&e);
            return Err(e);
        }
        drop(gate);
        Ok(())
    }

    /// 换算、越界处理与规划（调用者持有闸门）
    fn prepare(
        &self,
        kind: MoveKind,
        percent: f64,
        mode: MoveMode,
    ) -> Result<(i32, Trajectory), ClientError> {
        let config = &self.shared.config;
        if !percent.is_finite() {
            return Err(ClientError::PercentOutOfRange { percent });
        }

        let requested = match kind {
            MoveKind::Absolute => {
                if mode == MoveMode::Strict && !(0.0..=100.0).contains(&percent) {
                    return Err(ClientError::PercentOutOfRange { percent });
                }
                config.translate(percent)
            },
            MoveKind::Relative => {
                config.shift(self.shared.target_raw.load(Ordering::Acquire), percent)
            },
        };

        let target = match mode {
            MoveMode::Clamp => {
                let clamped = config.clamp(requested);
                if clamped != requested {
                    warn!(
                        "Actuator {} target {} clamped to {}",
                        config.id, requested, clamped
                    );
                }
                clamped
            },
            MoveMode::Strict if !config.contains(requested) => {
                return Err(ClientError::OutOfRange {
                    requested,
                    min: config.range_min,
                    max: config.range_max,
                });
            },
            MoveMode::Strict => requested,
        };

        let current = self.shared.current_raw.load(Ordering::Acquire);
        let trajectory =
            self.shared
                .planner
                .plan(current, target, config.buffer, config.delta)?;
        Ok((target, trajectory))
    }

    /// 取消剩余步骤并回到 `Idle`
    ///
    /// 当前位置保持在最后一次下发的位置，相对运动从该位置继续。
    pub fn stop(&self) {
        let shared = &*self.shared;
        let mut gate = shared.gate.lock();
        gate.generation = gate.generation.wrapping_add(1);
        shared.target_raw.store(
            shared.current_raw.load(Ordering::Acquire),
            Ordering::Release,
        );
        shared.set_state(MoveState::Idle);
        let _ = self.jobs.send(Job::Cancel);
        debug!("Actuator {} stopped", shared.config.id);
    }

    pub fn state(&self) -> MoveState {
        self.shared.state()
    }

    pub fn is_moving(&self) -> bool {
        self.state() == MoveState::Moving
    }

    /// 最后一次下发的原始位置
    pub fn current_raw(&self) -> i32 {
        self.shared.current_raw.load(Ordering::Acquire)
    }

    /// 最后一次请求的目标
    pub fn target_raw(&self) -> i32 {
        self.shared.target_raw.load(Ordering::Acquire)
    }

    /// 当前位置（百分比）
    pub fn current_percent(&self) -> f64 {
        self.shared.config.percent_of(self.current_raw())
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.shared.config
    }

    pub fn planner(&self) -> &TrajectoryPlanner {
        &self.shared.planner
    }

    /// 等待运动结束
    ///
    /// 超时仍在运动时返回 `false`。
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.shared.gate.lock();
        while self.shared.state() == MoveState::Moving {
            if self.shared.idle.wait_until(&mut gate, deadline).timed_out() {
                return self.shared.state() == MoveState::Idle;
            }
        }
        true
    }

    /// 工作线程是否仍在运行
    pub fn is_healthy(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for MoveExecutor {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("Actuator {} worker panicked", self.shared.config.id);
            }
        }
    }
}
