//! 着色令牌模型：数据类型、令牌多重集、候选绑定枚举以及带守卫的发生.
//!
//! 着色迁移的每条输入弧带一个变量名（默认为库所名），每次尝试发生时，
//! 按输入弧顺序深度优先地枚举各库所的令牌选择的笛卡尔积，
//! 第一个使守卫为真的绑定被接受。
use thiserror::Error;

pub mod binding;
pub mod data_type;
mod firing;
pub mod token;
pub mod value;

pub use binding::{Selection, Withdrawal};
pub use data_type::{ComponentKind, DataType};
pub use token::{Token, TokenBag};
pub use value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("token {token} does not conform to data type `{data_type}`")]
    NonConforming { token: String, data_type: String },
    #[error("place `{place}` has no data type")]
    NotColored { place: String },
    #[error("output `{variable}` of transition `{transition}` produced {value}, which is not a `{data_type}` token")]
    ProducedMismatch {
        transition: String,
        variable: String,
        value: String,
        data_type: String,
    },
}
