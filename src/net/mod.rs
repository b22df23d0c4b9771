//! # Petri 网执行引擎（Place/Transition Net）
//!
//! 设库所集合 `P` 与迁移集合 `T`。由弧导出后向矩阵 `Backward`、前向矩阵
//! `Forward`、关联矩阵 `Incidence = Forward - Backward` 与抑制矩阵
//! `Inhibition`，均为 `|P| × |T|`。对标识 `M`：
//!
//! * 迁移 `t` **可发生** 当且仅当对所有库所 `p`：
//!   1. `M[p] ≥ Backward[p, t]`（`M[p] = -1` 视为无界，总是满足）；
//!   2. 若 `cap[p] > 0`，则 `M[p] + Forward[p, t] - Backward[p, t] ≤ cap[p]`；
//!   3. 若 `Inhibition[p, t] > 0`，则 `M[p] < Inhibition[p, t]`；
//!
//!   随后只保留最高优先级的已使能瞬时迁移；只要有瞬时迁移使能，计时迁移一律禁用。
//! * 迁移 **发生** 后 `M' = M + Incidence[:, t]`。
//!
//! 矩阵按需重建，并由脏标志保证任何读取前已刷新；标识变化不触发拓扑重建。
//!
//! ## 示例
//!
//! ```rust
//! use petri_engine::net::*;
//!
//! let mut net = Net::seeded(7);
//! net.add_place(Place::new("p0").with_marking(1).with_capacity(1));
//! net.add_place(Place::new("p1").with_capacity(1));
//! net.add_transition(Transition::new("t0"));
//! net.add_arc(Arc::normal("P0", "T0", 1));
//! net.add_arc(Arc::normal("T0", "P1", 1));
//!
//! let t0 = TransitionId::new(0);
//! assert_eq!(net.enabled_transitions().into_vec(), vec![true]);
//! assert!(net.fire(t0).unwrap());
//! assert_eq!(net.current_marking().as_slice(), &[0, 1]);
//! assert!(net.fire_backward(t0).unwrap());
//! assert_eq!(net.current_marking().as_slice(), &[1, 0]);
//! assert!(!net.fire_backward(t0).unwrap());
//! ```

pub mod core;
pub mod enabling;
pub mod events;
pub mod ids;
pub mod incidence;
pub mod index_vec;
pub mod matrices;
pub mod selection;
pub mod structure;
pub mod undo;

pub use self::core::{Net, NetError};
pub use events::{Direction, NetEvent, NetListener};
pub use ids::{PlaceId, TransitionId};
pub use incidence::Incidence;
pub use index_vec::{Idx, IndexVec};
pub use matrices::{Dirty, StructuralMatrices};
pub use structure::{
    Annotation, Arc, ArcKind, Marking, NetObject, ObjectKind, Parameter, ParameterValue, Place,
    Tokens, Transition, DEFAULT_PRIORITY, UNBOUNDED,
};
pub use undo::{PlaceSnapshot, UndoEntry};
