// Actor模块 - 使用Actor模式管理并发状态
//
// 用Actor模式替代Arc<Mutex<T>>，通过消息传递实现并发控制
// 消除锁竞争，避免死锁风险

pub mod batch_status;
pub mod result_set;

pub use batch_status::{BatchStatus, BatchStatusActor, BatchStatusCommand, BatchStatusHandle};
pub use result_set::{ResultSetActor, ResultSetCommand, ResultSetHandle};
