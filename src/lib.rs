//! Petri 网执行引擎：结构矩阵、使能判定、加权随机发生，
//! 以及带守卫/更新公式的着色令牌扩展.
//!
//! 日志通过 `log` 门面输出；可执行程序或测试调用 [`init_logging`]，
//! 由 `PNE_LOG` 控制过滤级别、`PNE_LOG_STYLE` 控制着色。

pub mod color;
pub mod config;
pub mod formula;
pub mod net;
pub mod simulation;

pub use color::{ColorError, DataType, Token, TokenBag, Value};
pub use config::{EngineConfig, SimulationConfig};
pub use formula::{Formula, FormulaError};
pub use net::{
    Arc, Marking, Net, NetError, NetEvent, NetListener, NetObject, Place, PlaceId, Transition,
    TransitionId,
};
pub use simulation::{SimulationReport, simulate};

/// Installs an `env_logger` reading its filter from `PNE_LOG`. Does nothing
/// when a logger is already installed.
pub fn init_logging() {
    let env = env_logger::Env::new()
        .filter("PNE_LOG")
        .write_style("PNE_LOG_STYLE");
    let _ = env_logger::Builder::from_env(env).try_init();
}
