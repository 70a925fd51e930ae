//! Records a synthetic off-axis hologram of a few small discs, then filters the +1 order and refocuses it.
//!
//! Run with `RUST_LOG=numerical_propagation=debug` to see the propagator choices and cache activity.

use image::{Rgb, RgbImage};
use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex;
use numerical_propagation::wavefront::tilted_plane_wave;
use numerical_propagation::{
    BatchJob, BatchPlan, CancelToken, Channel, Engine, Field, Illumination, Method, OutputChannels,
    PropagationParameters, Propagator, SpectralRoi,
};
use palette::{Lch, Srgb};
use tracing_subscriber::EnvFilter;

const M: usize = 512;
const PITCH: f64 = 3.45;
const LAMBDA: f64 = 0.633;
const Z: f64 = 8000.0;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let object = discs(M, (PITCH, PITCH));
    save_real_image("refocus_object.png", object.modulus().view(), 1.0, true)?;

    // object wave at the camera, plus a reference tilted to put the carrier M/4 bins off axis
    let params = PropagationParameters::new(LAMBDA, Z, (PITCH, PITCH));
    let at_camera = Method::AngularSpectrum.propagate(&object, &params)?;
    let tilt = (LAMBDA / (4.0 * PITCH)).acos().to_degrees();
    let reference = tilted_plane_wave([M, M], (PITCH, PITCH), LAMBDA, (tilt, 90.0))?;
    let hologram = at_camera.add(&reference)?.modulus_squared();
    save_real_image("refocus_hologram.png", hologram.view(), 1.0, true)?;

    let mut engine = Engine::new();
    engine.load_field(Some(hologram.view()), None, (PITCH, PITCH))?;
    let spectrum = engine.spectrum()?.magnitude();
    save_real_image(
        "refocus_spectrum.png",
        log_intensity(spectrum.view(), 1e-6).view(),
        1.0,
        false,
    )?;

    // the object term sits M/4 below the centre along x
    let (w, h) = (M as i64 / 4, M as i64 / 4);
    let roi = SpectralRoi::new(M as i64 / 4 - w / 2, M as i64 / 2 - h / 2, w, h);
    engine.set_region_of_interest(roi);
    engine.filter_and_recenter()?;

    let focused = engine.propagate(
        Method::AngularSpectrum,
        params.with_distance(-Z),
        true,
        Illumination::Plane,
    )?;
    save_real_image("refocus_focused.png", focused.modulus().view(), 1.0, true)?;
    save_complex_image("refocus_focusedc.png", focused.values.view())?;

    // a step past the focus
    let defocused = engine.refocus(-2000.0)?;
    save_real_image("refocus_defocused.png", defocused.modulus().view(), 1.0, true)?;

    let job = BatchJob::new(
        BatchPlan::Planes {
            start: -Z - 3000.0,
            end: -Z + 3000.0,
            count: 7,
        },
        Method::Automatic,
        params,
        OutputChannels::only(Channel::Amplitude),
    );
    let output = engine.run_batch_parallel(&job, true, Illumination::Plane, &CancelToken::new())?;
    if let Some(stack) = output.stack(Channel::Amplitude) {
        for frame in &stack.frames {
            println!("{} pitch {:?}", frame.label(), frame.pitch);
            save_real_image(
                format!("refocus_batch_{}.png", frame.index),
                frame.data.view(),
                1.0,
                true,
            )?;
        }
    }
    println!("{} planes", output.planes());

    Ok(())
}

// soft edged discs of radius 40 on a dark background
fn discs(m: usize, pitch: (f64, f64)) -> Field {
    let centres = [(-300.0, -200.0), (250.0, -100.0), (0.0, 150.0), (-150.0, 300.0)];
    let radius = 40.0;
    let c = (m / 2) as f64;

    let mut values = Array2::zeros([m, m]);
    Zip::indexed(&mut values).par_for_each(|(i, j), e| {
        let x = (i as f64 - c) * pitch.0;
        let y = (j as f64 - c) * pitch.1;
        let value = centres.iter().fold(0.0f64, |acc, &(x0, y0)| {
            let r = ((x - x0).powi(2) + (y - y0).powi(2)).sqrt();
            acc.max(((radius - r) / pitch.0 + 0.5).max(0.0).min(1.0))
        });
        *e = Complex::new(value, 0.0);
    });

    Field { values, pitch }
}

pub fn log_intensity(arr: ArrayView2<f64>, min: f64) -> Array2<f64> {
    let log_min = -min.ln();
    let max = arr.iter().fold(0.0, |max, e| e.max(max));
    arr.map(|e| ((e / max).ln() / log_min + 1.0).max(0.0).min(1.0))
}

/// Axis 0 of `arr` becomes the image x axis.
pub fn save_real_image<T: AsRef<std::path::Path> + std::fmt::Debug>(
    file_name: T,
    arr: ArrayView2<f64>,
    amp: f64,
    normalise: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = arr.dim();
    let mut max: f64 = arr.iter().fold(0.0, |max, val| val.max(max));
    let sum = arr.iter().fold(0.0, |sum, val| val + sum);
    println!("w:{} h:{} max:{} sum:{} - {:?}", w, h, max, sum, file_name);

    let mut img = RgbImage::new(w as u32, h as u32);
    if !normalise || max == 0.0 {
        max = 1.0;
    }

    for (x, y, p) in img.enumerate_pixels_mut() {
        let value = arr[[x as usize, y as usize]] / max;
        let value = (value * amp).min(1.0).max(0.0);

        let colour = Srgb::from(Lch::new(value * 70.0, value * 128.0, 280.0 - 245.0 * value));
        *p = Rgb([
            (colour.red * 255.0) as u8,
            (colour.green * 255.0) as u8,
            (colour.blue * 255.0) as u8,
        ]);
    }

    img.save(file_name)?;
    Ok(())
}

/// Brightness from the modulus, hue from the phase.
pub fn save_complex_image<T: AsRef<std::path::Path> + std::fmt::Debug>(
    file_name: T,
    arr: ArrayView2<Complex<f64>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (w, h) = arr.dim();
    let max_sqr: f64 = arr.iter().fold(0.0, |max, val| val.norm_sqr().max(max));
    let sum_sqr: f64 = arr.iter().fold(0.0, |sum, val| val.norm_sqr() + sum);
    println!(
        "w:{} h:{} max_sqr:{} sum_sqr:{} - {:?}",
        w, h, max_sqr, sum_sqr, file_name
    );

    let max = max_sqr.sqrt().max(f64::MIN_POSITIVE);
    let mut img = RgbImage::new(w as u32, h as u32);

    for (x, y, p) in img.enumerate_pixels_mut() {
        let (r, theta) = arr[[x as usize, y as usize]].to_polar();
        let r = r / max;

        let colour = Srgb::from(Lch::new(
            r * 100.0,
            r * 128.0,
            360.0 * (theta / std::f64::consts::PI + 1.0) * 0.5,
        ));
        *p = Rgb([
            (colour.red * 255.0) as u8,
            (colour.green * 255.0) as u8,
            (colour.blue * 255.0) as u8,
        ]);
    }

    img.save(file_name)?;
    Ok(())
}
