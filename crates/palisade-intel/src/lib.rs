//! # Palisade Intel
//!
//! Factor intelligence: a shared factor return panel with three analyses
//! over it — cross-factor correlations, per-factor performance
//! profiles, and hedge/offset recommendations — plus user-basket
//! injection.
//!
//! Baskets are appended to a deep clone of the panel, tagged
//! `user_baskets`, and labeled `"Basket: <name>"`. The standard
//! bucketed correlation matrix excludes single-member buckets; the
//! dedicated basket overlay correlates each basket against every factor
//! pairwise so a lone basket still reaches recommendations. Cache keys
//! include the basket content fingerprint, returned even when every
//! basket fails.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod basket;
pub mod correlation;
pub mod error;
pub mod overlay;
pub mod performance;
pub mod recommend;

pub use basket::{basket_fingerprint, Basket, WeightingMethod};
pub use correlation::{
    category_correlations, column_correlations, CategoryCorrelations, ColumnCorrelations,
};
pub use error::{IntelError, IntelResult};
pub use overlay::{basket_overlay, inject_baskets, BasketInjection, BasketOverlay, BasketSkip};
pub use performance::{factor_profiles, FactorProfile};
pub use recommend::{
    recommend_for_portfolio, recommend_offsets, HedgeCandidate, OffsetRecommendation,
};
