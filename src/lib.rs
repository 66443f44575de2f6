pub mod listing;
pub mod logging;
pub mod videos;

pub mod util {
    pub mod env;
}
