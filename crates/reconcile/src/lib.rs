pub mod bootstrap;
pub mod reconciler;
pub mod surface;
pub mod work_area;

pub use bootstrap::*;
pub use reconciler::*;
pub use surface::*;
pub use work_area::*;
