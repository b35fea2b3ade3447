//! # Strata Curves
//!
//! Multi-curve construction and calibration for the Strata workspace.
//!
//! This crate provides:
//!
//! - **Curve types**: the ordered [`CurveType`] registry (discount, tenor,
//!   wildcard tags)
//! - **Knot points & curves**: [`PiecewiseCurve`] with pluggable
//!   interpolation/extrapolation and knot sensitivities
//! - **Spread surface**: [`TenorSpreadSurface`] with cross-tenor
//!   interpolation strategies
//! - **Models**: the [`CurveModel`] family (single-curve, multi-curve,
//!   multi-tenor) with analytic gradient accumulation
//! - **Knot placement**: the KPP strategy family (default, stripper,
//!   multi-tenor grid, fixed table, best-fit)
//! - **Calibration**: the damped Gauss-Newton driver repricing every
//!   instrument to (near) zero residual
//! - **CloneLookup**: deep-copy machinery preserving shared/cyclic
//!   reference topology for scenario rebuilds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_curves::prelude::*;
//!
//! let mut instruments = CalibrationInstruments::new()
//!     .with(Arc::new(Deposit::spot(today, CurveType::M3, 0.021, DayCount::Act360)?))
//!     .with(Arc::new(Swap::par(today, today.add_years(2)?, 0.025, CurveType::M3)?));
//!
//! let mut model = SingleCurveModel::new(today, CurveType::M3);
//! let kpp = SingleCurveStripperKpp::new(CashSelection::BaseRate);
//! kpp.select_instruments(&mut instruments, &model)?;
//! kpp.create_knot_points(&instruments, &mut model)?;
//!
//! let report = Calibrator::default().calibrate(&mut model, &instruments)?;
//! let df = model.discount_factor(1.5)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod calibration;
pub mod clone_lookup;
pub mod curve_type;
pub mod error;
pub mod instruments;
pub mod knots;
pub mod kpp;
pub mod model;
pub mod surface;

pub use calibration::{CalibrationConfig, CalibrationReport, CalibrationSolver, Calibrator};
pub use clone_lookup::{CloneLookup, CloneWithLookup};
pub use curve_type::CurveType;
pub use error::{CurveError, CurveResult};
pub use knots::{KnotPoint, PiecewiseCurve};
pub use model::{CurveModel, Formulation, ModelState, MultiCurveModel, MultiTenorModel, SingleCurveModel};
pub use surface::TenorSpreadSurface;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::calibration::{
        CalibrationConfig, CalibrationReport, CalibrationSolver, Calibrator,
    };
    pub use crate::clone_lookup::{CloneLookup, CloneWithLookup};
    pub use crate::curve_type::CurveType;
    pub use crate::error::{CurveError, CurveResult};
    pub use crate::instruments::{
        CalibrationInstrument, CalibrationInstruments, CrossCurrencyBasisSwap, Deposit, Fra,
        InstrumentId, InstrumentKind, Ois, PaymentSchedule, RateFuture, Swap, TenorBasisSwap,
    };
    pub use crate::knots::{KnotPoint, PiecewiseCurve};
    pub use crate::kpp::{
        BestFitKpp, CashSelection, FixedKpp, KnotPlacement, MultiTenorDefaultKpp,
        MultiTenorStripperKpp, SingleCurveDefaultKpp, SingleCurveStripperKpp,
        TenorSurfacePrecedence,
    };
    pub use crate::model::{
        CurveModel, Formulation, ModelState, MultiCurveModel, MultiTenorModel, SingleCurveModel,
    };
    pub use crate::surface::{
        BasicTss, BucketedTss, TenorSpreadSurface, TolerantStraightLineTss, TssInterpolation,
    };
}
