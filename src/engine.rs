//! Owned propagation state for one hologram.
//!
//! An [`Engine`] holds the loaded field, its spectrum, the filtered field and the spherical wave cache.
//! Every call takes `&mut self`, so concurrent requests need separate engines or explicit locking by the caller.

use crate::batch::{self, BatchJob, BatchOutput, CancelToken};
use crate::error::{PropagationError, Result};
use crate::filter::{filter_and_recenter, SpectralRoi, Spectrum};
use crate::params::{Illumination, PropagationParameters};
use crate::propagator::{Method, Propagator};
use crate::spherical::SphericalWaveCache;
use crate::Field;
use ndarray::ArrayView2;

/// Arguments of the last single plane propagation, kept for refocusing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub params: PropagationParameters,
    pub filtered: bool,
    pub illumination: Illumination,
}

#[derive(Debug, Default)]
pub struct Engine {
    field: Option<Field>,
    spectrum: Option<Spectrum>,
    roi: Option<SpectralRoi>,
    filtered: Option<Field>,
    cache: SphericalWaveCache,
    last: Option<Request>,
    output: Option<Field>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the field from its channels and replaces everything derived from the previous one.
    pub fn load_field(
        &mut self,
        real: Option<ArrayView2<f64>>,
        imaginary: Option<ArrayView2<f64>>,
        pitch: (f64, f64),
    ) -> Result<&Field> {
        let field = Field::from_channels(real, imaginary, pitch)?;
        Ok(self.set_field(field))
    }

    pub fn set_field(&mut self, field: Field) -> &Field {
        let [m, n] = field.shape();
        tracing::debug!(m, n, "field loaded");
        self.spectrum = None;
        self.roi = None;
        self.filtered = None;
        self.last = None;
        self.output = None;
        &*self.field.insert(field)
    }

    pub fn field(&self) -> Option<&Field> {
        self.field.as_ref()
    }

    pub fn filtered_field(&self) -> Option<&Field> {
        self.filtered.as_ref()
    }

    /// Result of the last `propagate` or `refocus`.
    pub fn output(&self) -> Option<&Field> {
        self.output.as_ref()
    }

    pub fn last_request(&self) -> Option<&Request> {
        self.last.as_ref()
    }

    /// Centred spectrum of the loaded field, computed on first use.
    pub fn spectrum(&mut self) -> Result<&Spectrum> {
        if self.spectrum.is_none() {
            let field = self.field.as_ref().ok_or(PropagationError::MissingInput("field"))?;
            self.spectrum = Some(Spectrum::from_field(field));
        }
        self.spectrum
            .as_ref()
            .ok_or(PropagationError::MissingInput("spectrum"))
    }

    /// Region used by the next `filter_and_recenter`.
    pub fn set_region_of_interest(&mut self, roi: SpectralRoi) {
        self.roi = Some(roi);
    }

    /// Pending region of interest, if any.
    pub fn region_of_interest(&self) -> Option<&SpectralRoi> {
        self.roi.as_ref()
    }

    /// Applies the pending region of interest to the spectrum. The region is consumed once filtering succeeds.
    pub fn filter_and_recenter(&mut self) -> Result<&Field> {
        if self.roi.is_none() {
            return Err(PropagationError::MissingInput("region of interest"));
        }
        self.spectrum()?;
        let filtered = match (&self.spectrum, &self.roi) {
            (Some(spectrum), Some(roi)) => filter_and_recenter(spectrum, roi)?,
            (None, _) => return Err(PropagationError::MissingInput("spectrum")),
            (_, None) => return Err(PropagationError::MissingInput("region of interest")),
        };
        self.roi = None;
        Ok(&*self.filtered.insert(filtered))
    }

    /// Propagates the loaded (or filtered) field, compensating the reference wave first when it is spherical.
    pub fn propagate(
        &mut self,
        method: Method,
        params: PropagationParameters,
        filtered: bool,
        illumination: Illumination,
    ) -> Result<&Field> {
        let request = Request {
            method,
            params,
            filtered,
            illumination,
        };
        let output = self.run_request(&request)?;
        self.last = Some(request);
        Ok(&*self.output.insert(output))
    }

    /// Moves the last propagation distance by `step` and propagates again.
    pub fn refocus(&mut self, step: f64) -> Result<&Field> {
        let last = self
            .last
            .ok_or(PropagationError::MissingInput("previous propagation"))?;
        let params = last.params.with_distance(last.params.distance + step);
        tracing::debug!(step, z = params.distance, "refocusing");
        self.propagate(last.method, params, last.filtered, last.illumination)
    }

    /// Runs a batch over the loaded (or filtered) field, compensated once for the whole batch.
    pub fn run_batch(
        &mut self,
        job: &BatchJob,
        filtered: bool,
        illumination: Illumination,
        cancel: &CancelToken,
    ) -> Result<BatchOutput> {
        let base = self.base_field(filtered, illumination, job.params.pitch)?;
        batch::run(job, &base, cancel)
    }

    /// As `run_batch`, with the planes computed in parallel.
    pub fn run_batch_parallel(
        &mut self,
        job: &BatchJob,
        filtered: bool,
        illumination: Illumination,
        cancel: &CancelToken,
    ) -> Result<BatchOutput> {
        let base = self.base_field(filtered, illumination, job.params.pitch)?;
        batch::run_parallel(job, &base, cancel)
    }

    fn run_request(&mut self, request: &Request) -> Result<Field> {
        request.params.validate()?;
        let base = self.base_field(request.filtered, request.illumination, request.params.pitch)?;
        if base.pitch != request.params.pitch {
            tracing::debug!(
                field = ?base.pitch,
                params = ?request.params.pitch,
                "parameter pitch differs from field pitch"
            );
        }
        request.method.propagate(&base, &request.params)
    }

    // the reference wave is sampled at the propagation pitch, not the pitch the field was loaded with
    fn base_field(&mut self, filtered: bool, illumination: Illumination, pitch: (f64, f64)) -> Result<Field> {
        let field = if filtered {
            self.filtered
                .as_ref()
                .ok_or(PropagationError::MissingInput("filtered field"))?
        } else {
            self.field.as_ref().ok_or(PropagationError::MissingInput("field"))?
        };
        match illumination {
            Illumination::Plane => Ok(field.clone()),
            Illumination::Spherical { radius } => self.cache.compensate(field, radius, pitch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchPlan, Channel, OutputChannels};
    use crate::test_util::{assert_fields_close, gaussian};
    use ndarray::Array2;

    fn loaded() -> Engine {
        let mut engine = Engine::new();
        engine.set_field(gaussian([32, 32], (5.0, 5.0), 30.0, (0.0, 0.0)));
        engine
    }

    #[test]
    fn load_requires_a_channel_and_matching_shapes() {
        let mut engine = Engine::new();
        assert_eq!(
            engine.load_field(None, None, (1.0, 1.0)).unwrap_err(),
            PropagationError::MissingChannel
        );

        let re = Array2::<f64>::zeros((4, 4));
        let im = Array2::<f64>::zeros((4, 5));
        assert!(matches!(
            engine.load_field(Some(re.view()), Some(im.view()), (1.0, 1.0)),
            Err(PropagationError::Dimension { .. })
        ));
        assert!(engine.field().is_none());

        let field = engine.load_field(None, Some(im.view()), (1.0, 1.0)).unwrap();
        assert_eq!(field.shape(), [4, 5]);
    }

    #[test]
    fn operations_need_their_inputs() {
        let mut engine = Engine::new();
        let params = PropagationParameters::new(0.5, 10.0, (5.0, 5.0));
        assert_eq!(
            engine.spectrum().unwrap_err(),
            PropagationError::MissingInput("field")
        );
        assert_eq!(
            engine.refocus(1.0).unwrap_err(),
            PropagationError::MissingInput("previous propagation")
        );

        let mut engine = loaded();
        assert_eq!(
            engine.filter_and_recenter().unwrap_err(),
            PropagationError::MissingInput("region of interest")
        );
        assert_eq!(
            engine
                .propagate(Method::Fresnel, params, true, Illumination::Plane)
                .unwrap_err(),
            PropagationError::MissingInput("filtered field")
        );
    }

    #[test]
    fn bad_parameters_fail_before_propagation() {
        let mut engine = loaded();
        let params = PropagationParameters::new(-0.5, 10.0, (5.0, 5.0));
        let err = engine
            .propagate(Method::AngularSpectrum, params, false, Illumination::Plane)
            .unwrap_err();
        assert!(err.is_invalid_parameter());
        assert!(engine.output().is_none());
        assert!(engine.last_request().is_none());
    }

    #[test]
    fn full_frame_filter_feeds_propagation() {
        let mut engine = loaded();
        let shape = engine.spectrum().unwrap().shape();
        engine.set_region_of_interest(SpectralRoi::full(shape));
        let filtered = engine.filter_and_recenter().unwrap().clone();
        assert_fields_close(&filtered, engine.field().unwrap(), 1e-9);

        // the region is used once
        assert!(engine.filter_and_recenter().is_err());

        let params = PropagationParameters::new(0.633, 500.0, (5.0, 5.0));
        let out = engine
            .propagate(Method::AngularSpectrum, params, true, Illumination::Plane)
            .unwrap()
            .clone();
        let expected = Method::AngularSpectrum.propagate(&filtered, &params).unwrap();
        assert_fields_close(&out, &expected, 0.0);
    }

    #[test]
    fn spherical_illumination_is_compensated() {
        let mut engine = loaded();
        let params = PropagationParameters::new(0.633, 2e4, (5.0, 5.0));
        let radius = -5e4;
        let out = engine
            .propagate(
                Method::Fresnel,
                params,
                false,
                Illumination::Spherical { radius },
            )
            .unwrap()
            .clone();

        let field = engine.field().unwrap().clone();
        let compensated = SphericalWaveCache::new()
            .compensate(&field, radius, params.pitch)
            .unwrap();
        let expected = Method::Fresnel.propagate(&compensated, &params).unwrap();
        assert_fields_close(&out, &expected, 0.0);
    }

    #[test]
    fn compensation_uses_parameter_pitch() {
        let mut engine = Engine::new();
        engine.set_field(gaussian([32, 32], (1.0, 1.0), 6.0, (0.0, 0.0)));
        let params = PropagationParameters::new(0.633, 2e4, (5.0, 5.0));
        let illumination = Illumination::Spherical { radius: 1e4 };
        let out = engine
            .propagate(Method::Fresnel, params, false, illumination)
            .unwrap()
            .clone();

        let field = engine.field().unwrap().clone();
        let at_params = SphericalWaveCache::new()
            .compensate(&field, 1e4, params.pitch)
            .unwrap();
        let expected = Method::Fresnel.propagate(&at_params, &params).unwrap();
        assert_fields_close(&out, &expected, 0.0);

        let at_field = SphericalWaveCache::new()
            .compensate(&field, 1e4, field.pitch)
            .unwrap();
        let wrong = Method::Fresnel.propagate(&at_field, &params).unwrap();
        let diff = out
            .values
            .iter()
            .zip(wrong.values.iter())
            .fold(0.0f64, |m, (a, b)| m.max((a - b).norm()));
        assert!(diff > 1e-6, "{}", diff);
    }

    #[test]
    fn failed_filter_keeps_pending_region() {
        let mut engine = Engine::new();
        engine.set_region_of_interest(SpectralRoi::new(0, 0, 4, 4));
        assert_eq!(
            engine.filter_and_recenter().unwrap_err(),
            PropagationError::MissingInput("field")
        );
        assert!(engine.region_of_interest().is_some());

        let mut engine = loaded();
        engine.set_region_of_interest(SpectralRoi::new(100, 0, 4, 4));
        assert!(matches!(
            engine.filter_and_recenter(),
            Err(PropagationError::EmptyRoi { .. })
        ));
        assert!(engine.region_of_interest().is_some());

        engine.set_region_of_interest(SpectralRoi::full([32, 32]));
        engine.filter_and_recenter().unwrap();
        assert!(engine.region_of_interest().is_none());
    }

    #[test]
    fn refocus_steps_the_last_distance() {
        let mut engine = loaded();
        let params = PropagationParameters::new(0.633, 1000.0, (5.0, 5.0));
        engine
            .propagate(Method::AngularSpectrum, params, false, Illumination::Plane)
            .unwrap();

        let out = engine.refocus(-250.0).unwrap().clone();
        assert_eq!(engine.last_request().unwrap().params.distance, 750.0);

        let field = engine.field().unwrap().clone();
        let expected = Method::AngularSpectrum
            .propagate(&field, &params.with_distance(750.0))
            .unwrap();
        assert_fields_close(&out, &expected, 0.0);

        // stepping back to zero returns the input
        let back = engine.refocus(-750.0).unwrap().clone();
        assert_fields_close(&back, &field, 1e-9);
    }

    #[test]
    fn loading_a_new_field_clears_derived_state() {
        let mut engine = loaded();
        let params = PropagationParameters::new(0.633, 1000.0, (5.0, 5.0));
        engine.spectrum().unwrap();
        engine
            .propagate(Method::AngularSpectrum, params, false, Illumination::Plane)
            .unwrap();

        engine.set_field(gaussian([16, 8], (5.0, 5.0), 10.0, (0.0, 0.0)));
        assert!(engine.output().is_none());
        assert!(engine.refocus(1.0).is_err());
        assert_eq!(engine.spectrum().unwrap().shape(), [16, 8]);
    }

    #[test]
    fn batch_runs_on_compensated_base() {
        let mut engine = loaded();
        let params = PropagationParameters::new(0.633, 0.0, (5.0, 5.0));
        let job = BatchJob::new(
            BatchPlan::Planes {
                start: 100.0,
                end: 300.0,
                count: 3,
            },
            Method::AngularSpectrum,
            params,
            OutputChannels::only(Channel::Intensity),
        );
        let illumination = Illumination::Spherical { radius: 1e4 };

        let sequential = engine
            .run_batch(&job, false, illumination, &CancelToken::new())
            .unwrap();
        let parallel = engine
            .run_batch_parallel(&job, false, illumination, &CancelToken::new())
            .unwrap();
        assert_eq!(sequential, parallel);

        let last = engine
            .propagate(Method::AngularSpectrum, params.with_distance(300.0), false, illumination)
            .unwrap();
        let frame = &sequential.stack(Channel::Intensity).unwrap().frames[2];
        assert_eq!(frame.data, last.modulus_squared());
    }
}
