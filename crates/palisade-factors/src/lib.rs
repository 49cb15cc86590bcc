//! # Palisade Factors
//!
//! Factor-model risk decomposition.
//!
//! The pipeline: assign factor proxies to every non-cash canonical
//! position, build one shared monthly factor panel from the proxy
//! universe, fit a per-asset OLS regression, and decompose portfolio
//! variance into systematic and idiosyncratic parts with Euler risk
//! contributions.
//!
//! ## Invariants
//!
//! - `var_factor + var_idio = var_port` (relative error ≤ 1e-9)
//! - `Σ RC_i = σ_port` (relative error ≤ 1e-9)
//! - Futures carry asset-class proxies only; the equity factor set never
//!   contaminates a commodity decomposition
//! - Missing months are dropped per regression, never globally
//! - All upstream I/O is finished (in [`decomposition::collect_inputs`])
//!   before any numerical stage runs

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod decomposition;
pub mod error;
pub mod panel;
pub mod proxy;
pub mod regression;

pub use decomposition::{
    collect_inputs, decompose, decompose_with_weights, DecompositionConfig, FactorDecomposition,
    FactorInputs, RiskContribution,
};
pub use error::{FactorError, FactorResult};
pub use panel::{build_panel, composite_key, FactorPanel, CATEGORY_USER_BASKETS};
pub use proxy::{assign_proxies, FactorProxies, ProxyConfig};
pub use regression::{
    asset_columns, regress_asset, AssetRegression, RegressionOutcome, DEFAULT_MIN_OBS,
};
