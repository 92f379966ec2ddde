pub mod http;
pub mod script;

#[cfg(feature = "browser")]
pub mod browser;

pub use http::{DESKTOP_USER_AGENT, HttpSession, HttpSessionFactory};

#[cfg(feature = "browser")]
pub use browser::{BrowserOptions, BrowserSession, BrowserSessionFactory};
