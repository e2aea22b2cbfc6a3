mod campaign;
mod donation;
mod parish;

pub use campaign::*;
pub use donation::*;
pub use parish::*;
