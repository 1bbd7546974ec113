//! 内存存储实现（测试与未配置数据库时使用）

mod reading;

pub use reading::InMemoryReadingStore;
