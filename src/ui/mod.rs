//! UI components module.
//!
//! This module provides UI components that consume engine notifications.

pub mod badges;

pub use badges::{
    BadgeView, BadgeViewBuilder, BadgeViewHandle, BadgeViewState, BadgesChangedCallback,
    MessageCallback,
};
