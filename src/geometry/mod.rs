//! Planar geometry for the protected subject region.
//!
//! - **Points and polygons**: shoelace area, convexity, point-in-polygon
//! - **Convex hull**: Graham scan over pose keypoints
//! - **Expansion**: outward margin around the hull

pub mod hull;
pub mod point;
pub mod polygon;

pub use hull::{convex_hull, expand_hull, margin_radius, DegenerateHull, ExpandedHull, ExpansionMethod};
pub use point::Point;
pub use polygon::{BoundingRect, Polygon};
