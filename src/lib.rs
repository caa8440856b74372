use wasm_bindgen::prelude::*;
mod api;
mod error;
mod interop;
mod logging;

pub use logging::{init_logging, set_panic_hook};

#[wasm_bindgen]
pub struct Viewer { pub(crate) inner: lifetiles::Session }

impl Viewer {
    pub fn rs_new(config: lifetiles::ViewConfig) -> Viewer { Viewer { inner: lifetiles::Session::new(config) } }
    pub fn rs_session(&self) -> &lifetiles::Session { &self.inner }
}
