pub mod completions;
pub mod inspect;
pub mod reduce;
pub mod solve;
pub mod util;
