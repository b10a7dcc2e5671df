//! Negative log-likelihood losses over (model, dataset, fit range) triples.

use crate::constraint::{Constraint, constraints_nll};
use crate::context::RunContext;
use crate::data::Dataset;
use crate::pdf::PdfRef;
use mlfit_core::parameter::extend_unique;
use mlfit_core::{Error, Loss, Parameter, Result, Space};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A single value or a list of values, for loss inputs that may describe one or several
/// components.
#[derive(Debug, Clone)]
pub enum OneOrMany<T> {
    /// A single component.
    One(T),
    /// Several components (simultaneous fit).
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// `true` for [`OneOrMany::Many`].
    pub fn is_many(&self) -> bool {
        matches!(self, OneOrMany::Many(_))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(v) => v.len(),
        }
    }

    /// `true` for an empty [`OneOrMany::Many`].
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements as a list.
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(x) => vec![x],
            OneOrMany::Many(v) => v,
        }
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(v: Vec<T>) -> Self {
        OneOrMany::Many(v)
    }
}

/// Flavour of an [`UnbinnedNll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NllKind {
    /// Shape-only likelihood.
    Unbinned,
    /// Shape likelihood plus a Poisson term per component for the yield.
    Extended,
}

impl NllKind {
    fn loss_name(self) -> &'static str {
        match self {
            NllKind::Unbinned => "UnbinnedNLL",
            NllKind::Extended => "ExtendedUnbinnedNLL",
        }
    }
}

/// Memoized loss value, valid while every tracked parameter keeps its version stamp.
#[derive(Debug, Clone)]
struct CachedValue {
    params: Vec<Parameter>,
    stamps: Vec<u64>,
    value: f64,
}

impl CachedValue {
    fn is_current(&self) -> bool {
        self.params.iter().zip(&self.stamps).all(|(p, &s)| p.version() == s)
    }

    fn matches(&self, params: &[Parameter]) -> bool {
        self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| a.ptr_eq(b))
            && self.is_current()
    }
}

/// Unbinned (optionally extended) negative log-likelihood.
///
/// `value = Σ_components -Σ_events w ln(p / ν) + Σ_constraints -ln prior`, where `p` is the
/// model density over the component's fit range and `ν` the model yield (1 for non-extended
/// models). The extended flavour additionally subtracts `Σ_components (-ν + n ln ν)` with `n`
/// the (weighted) event count.
pub struct UnbinnedNll {
    kind: NllKind,
    models: Vec<PdfRef>,
    data: Vec<Arc<Dataset>>,
    fit_ranges: Vec<Space>,
    constraints: Vec<Constraint>,
    ctx: Arc<RunContext>,
    cache: Mutex<Option<CachedValue>>,
}

impl UnbinnedNll {
    /// Shape-only likelihood.
    ///
    /// Without `fit_range`, every model's normalization range must equal its dataset's data
    /// range. `fit_range` follows the shape of `model`: one space for a single model, one per
    /// component otherwise.
    pub fn new(
        model: OneOrMany<PdfRef>,
        data: OneOrMany<Arc<Dataset>>,
        fit_range: Option<OneOrMany<Space>>,
        ctx: Arc<RunContext>,
    ) -> Result<Self> {
        Self::build(NllKind::Unbinned, model, data, fit_range, ctx)
    }

    /// Extended likelihood; every model has to be extended.
    pub fn extended(
        model: OneOrMany<PdfRef>,
        data: OneOrMany<Arc<Dataset>>,
        fit_range: Option<OneOrMany<Space>>,
        ctx: Arc<RunContext>,
    ) -> Result<Self> {
        Self::build(NllKind::Extended, model, data, fit_range, ctx)
    }

    fn build(
        kind: NllKind,
        model: OneOrMany<PdfRef>,
        data: OneOrMany<Arc<Dataset>>,
        fit_range: Option<OneOrMany<Space>>,
        ctx: Arc<RunContext>,
    ) -> Result<Self> {
        if model.is_many() != data.is_many() {
            return Err(Error::Validation(
                "model and data either both have to be a list or not".into(),
            ));
        }
        if !model.is_many() && fit_range.as_ref().is_some_and(OneOrMany::is_many) {
            return Err(Error::Validation(
                "model and data are not lists, fit_range can't be a list then".into(),
            ));
        }
        if model.is_many() && fit_range.as_ref().is_some_and(|r| !r.is_many()) {
            return Err(Error::Validation(
                "model and data are lists, fit_range has to be a list with one range each".into(),
            ));
        }
        ctx.validate()?;

        let models = model.into_vec();
        let data = data.into_vec();
        if models.is_empty() {
            return Err(Error::Validation("a loss needs at least one model".into()));
        }
        if models.len() != data.len() {
            return Err(Error::Validation(format!(
                "model and data don't have the same number of components: {} vs {}",
                models.len(),
                data.len()
            )));
        }

        let fit_ranges = match fit_range {
            None => {
                let mut ranges = Vec::with_capacity(models.len());
                for (m, d) in models.iter().zip(&data) {
                    let data_range = m.convert_sort_space(d.data_range());
                    if data_range.as_ref().ok() != Some(m.norm_range()) {
                        return Err(Error::AmbiguousIntention(format!(
                            "no fit range given and model '{}' ({}) and its data ({}) are defined \
                             in different ranges; make them consistent or specify the fit range",
                            m.name(),
                            m.norm_range(),
                            d.data_range()
                        )));
                    }
                    ranges.push(m.norm_range().clone());
                }
                ranges
            }
            Some(OneOrMany::One(range)) => vec![range],
            Some(OneOrMany::Many(ranges)) => ranges,
        };
        if fit_ranges.len() != models.len() {
            return Err(Error::Validation(format!(
                "model, data and fit_range don't have the same number of components: {} vs {}",
                models.len(),
                fit_ranges.len()
            )));
        }

        let fit_ranges = models
            .iter()
            .zip(fit_ranges)
            .map(|(m, range)| {
                let range = m.convert_sort_space(&range)?;
                if !range.has_limits() {
                    return Err(Error::InvalidSpace(format!(
                        "fit range for model '{}' has no limits: {range}",
                        m.name()
                    )));
                }
                if range.n_limits() > 1 {
                    return Err(Error::MultipleLimitsNotSupported(format!(
                        "fit range for model '{}' has {} boxes",
                        m.name(),
                        range.n_limits()
                    )));
                }
                Ok(range)
            })
            .collect::<Result<Vec<_>>>()?;

        for (m, d) in models.iter().zip(&data) {
            if !d.has_axes(m.space().axes()) {
                return Err(Error::Validation(format!(
                    "data over {} lacks axes of model '{}' ({:?})",
                    d.data_range(),
                    m.name(),
                    m.space().axes()
                )));
            }
            if kind == NllKind::Extended && !m.is_extended() {
                return Err(Error::NotExtendedPdf(format!(
                    "model '{}' is not extended but has to be for an extended fit",
                    m.name()
                )));
            }
        }

        Ok(Self {
            kind,
            models,
            data,
            fit_ranges,
            constraints: Vec::new(),
            ctx,
            cache: Mutex::new(None),
        })
    }

    /// Builder: attach constraints.
    pub fn with_constraints(mut self, constraints: Vec<Constraint>) -> Result<Self> {
        self.add_constraints(constraints)?;
        Ok(self)
    }

    /// Likelihood flavour.
    pub fn kind(&self) -> NllKind {
        self.kind
    }

    /// Component models.
    pub fn models(&self) -> &[PdfRef] {
        &self.models
    }

    /// Component datasets.
    pub fn data(&self) -> &[Arc<Dataset>] {
        &self.data
    }

    /// Component fit ranges (axes in model order).
    pub fn fit_ranges(&self) -> &[Space] {
        &self.fit_ranges
    }

    /// Constraint terms.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Execution context.
    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Append constraints. A memoized value that is still current is updated with the new
    /// terms instead of being recomputed.
    pub fn add_constraints(&mut self, constraints: Vec<Constraint>) -> Result<()> {
        let added = constraints_nll(&constraints)?;
        let cache = self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.as_mut().filter(|c| c.is_current()) {
            cached.value += added;
            for c in &constraints {
                if !cached.params.iter().any(|p| p.ptr_eq(c.param())) {
                    cached.params.push(c.param().clone());
                    cached.stamps.push(c.param().version());
                }
            }
        } else {
            *cache = None;
        }
        self.constraints.extend(constraints);
        Ok(())
    }

    /// Remove all constraints.
    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
        *self.cache.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Simultaneous loss over the components of `self` and `other`.
    ///
    /// Both losses must be of the same kind. Constraints are united (a constraint present in
    /// both is kept once); the context of `self` is used.
    pub fn combine(&self, other: &UnbinnedNll) -> Result<UnbinnedNll> {
        if self.kind != other.kind {
            return Err(Error::IncompatibleLoss(format!(
                "cannot combine {} with {}",
                self.kind.loss_name(),
                other.kind.loss_name()
            )));
        }
        let mut constraints = self.constraints.clone();
        for c in &other.constraints {
            if !constraints.contains(c) {
                constraints.push(c.clone());
            }
        }
        Ok(UnbinnedNll {
            kind: self.kind,
            models: self.models.iter().chain(&other.models).cloned().collect(),
            data: self.data.iter().chain(&other.data).cloned().collect(),
            fit_ranges: self.fit_ranges.iter().chain(&other.fit_ranges).cloned().collect(),
            constraints,
            ctx: self.ctx.clone(),
            cache: Mutex::new(None),
        })
    }

    /// Simultaneous loss over all components of `losses` (left to right).
    pub fn combine_simultaneous(losses: &[UnbinnedNll]) -> Result<UnbinnedNll> {
        let (first, rest) = losses
            .split_first()
            .ok_or_else(|| Error::Validation("cannot combine an empty list of losses".into()))?;
        rest.iter().try_fold(first.clone(), |acc, l| acc.combine(l))
    }

    /// Parameters whose values the loss value depends on (floating or not).
    fn tracked_params(&self) -> Vec<Parameter> {
        let mut params = Vec::new();
        for m in &self.models {
            extend_unique(&mut params, m.params());
        }
        extend_unique(&mut params, self.constraints.iter().map(|c| c.param().clone()));
        params
    }

    fn compute(&self) -> Result<f64> {
        let mut nll = 0.0;
        for ((model, data), range) in self.models.iter().zip(&self.data).zip(&self.fit_ranges) {
            let probs = model.pdf(data, Some(range), &self.ctx)?;
            let yield_ = match model.get_yield().filter(|_| model.is_extended()) {
                Some(y) => y.value(),
                None => 1.0,
            };
            nll -= match data.weights() {
                Some(w) => probs.iter().zip(w).map(|(p, w)| w * (p / yield_).ln()).sum::<f64>(),
                None => probs.iter().map(|p| (p / yield_).ln()).sum::<f64>(),
            };

            if self.kind == NllKind::Extended {
                let n = data.sum_weights();
                nll -= -yield_ + n * yield_.ln();
            }
        }
        Ok(nll + constraints_nll(&self.constraints)?)
    }
}

impl Loss for UnbinnedNll {
    fn name(&self) -> &str {
        self.kind.loss_name()
    }

    fn value(&self) -> Result<f64> {
        let params = self.tracked_params();
        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = cache.as_ref().filter(|c| c.matches(&params)) {
                return Ok(cached.value);
            }
        }
        // Stamps are taken before evaluating so a change during evaluation leaves the memo stale.
        let stamps = params.iter().map(Parameter::version).collect();
        let value = self.compute()?;
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(CachedValue { params, stamps, value });
        Ok(value)
    }

    fn get_dependents(&self, only_floating: bool) -> Vec<Parameter> {
        let mut params = self.tracked_params();
        params.retain(|p| !only_floating || p.is_floating());
        params
    }

    fn errordef(&self, sigma: f64) -> Result<f64> {
        Ok(0.5 * sigma * sigma)
    }
}

/// Clones share models, data and context; the memo starts empty.
impl Clone for UnbinnedNll {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            models: self.models.clone(),
            data: self.data.clone(),
            fit_ranges: self.fit_ranges.clone(),
            constraints: self.constraints.clone(),
            ctx: self.ctx.clone(),
            cache: Mutex::new(None),
        }
    }
}

impl fmt::Debug for UnbinnedNll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnbinnedNll")
            .field("kind", &self.kind)
            .field("models", &self.models.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("fit_ranges", &self.fit_ranges)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

/// Objective computed by an arbitrary closure.
///
/// Bypasses models and data entirely. Its error definition is unavailable, so uncertainty
/// estimation refuses to run on it.
pub struct SimpleLoss {
    func: Box<dyn Fn() -> Result<f64> + Send + Sync>,
    params: Vec<Parameter>,
}

impl SimpleLoss {
    /// Wrap `func`; `params` lists the parameters it reads.
    pub fn new(func: impl Fn() -> Result<f64> + Send + Sync + 'static, params: Vec<Parameter>) -> Self {
        let mut unique = Vec::with_capacity(params.len());
        extend_unique(&mut unique, params);
        Self { func: Box::new(func), params: unique }
    }
}

impl Loss for SimpleLoss {
    fn name(&self) -> &str {
        "SimpleLoss"
    }

    fn value(&self) -> Result<f64> {
        (self.func)()
    }

    fn get_dependents(&self, only_floating: bool) -> Vec<Parameter> {
        self.params.iter().filter(|p| !only_floating || p.is_floating()).cloned().collect()
    }

    fn errordef(&self, _sigma: f64) -> Result<f64> {
        Err(Error::ErrordefUnavailable(
            "for this simple loss function, no error calculation is possible".into(),
        ))
    }
}

impl fmt::Debug for SimpleLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleLoss").field("params", &self.params).finish_non_exhaustive()
    }
}
