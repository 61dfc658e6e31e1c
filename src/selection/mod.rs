//! Selection of erasable pixel sets.
//!
//! - **Components**: connected residue groups outside the protective hull
//! - **Magic wand**: color flood fill used when pose data is unusable
//! - **Runs**: run-length encoded pixel membership shared by both

pub mod components;
pub mod magic_wand;
pub mod runs;

pub use components::{group_residue, ComponentGroup, GroupId, Grouping, OversizedComponent};
pub use magic_wand::{magic_wand_select, FallbackRegion, WandOutcome};
pub use runs::{PixelBounds, PixelRun, PixelRuns};
