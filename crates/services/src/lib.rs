//! # services
//!
//! Business rules over the `domains` ports: follow edges and their
//! counters, reactions and content aggregates, comments, badges.

pub mod badges;
pub mod comments;
pub mod content;
pub mod engagement;
pub mod relationships;
pub mod tables;
pub mod validation;

pub use badges::BadgeService;
pub use comments::{CommentService, NewComment};
pub use content::ContentService;
pub use engagement::{EngagementService, Reaction};
pub use relationships::RelationshipService;
