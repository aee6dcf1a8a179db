pub mod client;
pub mod cookies;
pub mod flash;
pub mod forms;
pub mod page;
pub mod templates;

pub use client::ClientMeta;
pub use flash::Flash;
pub use forms::FormErrors;
pub use page::Viewer;
