//! API request handlers

mod compliance;
mod content;
mod documents;
mod events;
mod health;
mod rules;
mod steps;
mod users;

pub use compliance::*;
pub use content::*;
pub use documents::*;
pub use events::*;
pub use health::*;
pub use rules::*;
pub use steps::*;
pub use users::*;

use copydesk_storage::QueryWindow;
use serde::Deserialize;

/// `?limit=&offset=` paging; a zero limit means no limit
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl PageQuery {
    pub fn window(&self) -> QueryWindow {
        QueryWindow::new(self.limit, self.offset)
    }
}

fn default_limit() -> usize {
    50
}
