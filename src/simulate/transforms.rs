//! Built-in dichromacy transforms.
//!
//! All matrices operate on linear RGB (sRGB primaries) and come from the
//! published libDaltonLens constants. Severity blends the linear original
//! toward the fully simulated pixel.

use super::color::{self, IDENTITY, Mat3, Rgb};
use super::{CvdTransform, TransformError};
use crate::types::{Algorithm, Deficiency};
use image::RgbImage;

/// Two half-plane projections with a separating plane normal.
struct BrettelParams {
    m1: Mat3,
    m2: Mat3,
    normal: Rgb,
}

const BRETTEL_PROTAN: BrettelParams = BrettelParams {
    m1: [
        0.14980, 1.19548, -0.34528, 0.10764, 0.84864, 0.04372, 0.00384, -0.00540, 1.00156,
    ],
    m2: [
        0.14570, 1.16172, -0.30742, 0.10816, 0.85291, 0.03892, 0.00386, -0.00524, 1.00139,
    ],
    normal: [0.00048, 0.00393, -0.00441],
};

const BRETTEL_DEUTAN: BrettelParams = BrettelParams {
    m1: [
        0.36477, 0.86381, -0.22858, 0.26294, 0.64245, 0.09462, -0.02006, 0.02728, 0.99278,
    ],
    m2: [
        0.37298, 0.88166, -0.25464, 0.25954, 0.63506, 0.10540, -0.01980, 0.02784, 0.99196,
    ],
    normal: [-0.00281, -0.00611, 0.00892],
};

const BRETTEL_TRITAN: BrettelParams = BrettelParams {
    m1: [
        1.01277, 0.13548, -0.14826, -0.01243, 0.86812, 0.14431, 0.07589, 0.80500, 0.11911,
    ],
    m2: [
        0.93678, 0.18979, -0.12657, 0.06154, 0.81526, 0.12320, -0.37562, 1.12767, 0.24796,
    ],
    normal: [0.03901, -0.02788, -0.01113],
};

const VIENOT_PROTAN: Mat3 = [
    0.11238, 0.88762, 0.0, 0.11238, 0.88762, 0.0, 0.00401, -0.00401, 1.0,
];
const VIENOT_DEUTAN: Mat3 = [
    0.29275, 0.70725, 0.0, 0.29275, 0.70725, 0.0, -0.02234, 0.02234, 1.0,
];
const VIENOT_TRITAN: Mat3 = [
    1.0, 0.14461, -0.14461, 0.0, 0.85924, 0.14076, 0.0, 0.85924, 0.14076,
];

// Severity 1.0
const MACHADO_PROTAN: Mat3 = [
    0.152286, 1.052583, -0.204868, 0.114503, 0.786281, 0.099216, -0.003882, -0.048116, 1.051998,
];
const MACHADO_DEUTAN: Mat3 = [
    0.367322, 0.860646, -0.227968, 0.280085, 0.672501, 0.047413, -0.011820, 0.042940, 0.968881,
];
const MACHADO_TRITAN: Mat3 = [
    1.255528, -0.076749, -0.178779, -0.078411, 0.930809, 0.147602, 0.004733, 0.691367, 0.303900,
];

fn check_severity(severity: f64) -> Result<f32, TransformError> {
    if (0.0..=1.0).contains(&severity) {
        Ok(severity as f32)
    } else {
        Err(TransformError::Severity(severity))
    }
}

/// Run `f` over every pixel in linear space and blend by `severity`.
fn map_linear(image: &RgbImage, severity: f32, f: impl Fn(Rgb) -> Rgb) -> RgbImage {
    if severity == 0.0 {
        return image.clone();
    }
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let lin = [
            color::srgb_to_linear(px[0]),
            color::srgb_to_linear(px[1]),
            color::srgb_to_linear(px[2]),
        ];
        let sim = color::lerp(lin, f(lin), severity);
        px.0 = [
            color::linear_to_srgb(sim[0]),
            color::linear_to_srgb(sim[1]),
            color::linear_to_srgb(sim[2]),
        ];
    }
    out
}

/// Brettel, Viénot & Mollon (1997).
pub struct Brettel;

impl CvdTransform for Brettel {
    fn simulate_cvd(
        &self,
        image: &RgbImage,
        deficiency: Deficiency,
        severity: f64,
    ) -> Result<RgbImage, TransformError> {
        let severity = check_severity(severity)?;
        let params = match deficiency {
            Deficiency::Protan => &BRETTEL_PROTAN,
            Deficiency::Deutan => &BRETTEL_DEUTAN,
            Deficiency::Tritan => &BRETTEL_TRITAN,
        };
        Ok(map_linear(image, severity, |rgb| {
            let m = if color::dot(rgb, params.normal) >= 0.0 {
                &params.m1
            } else {
                &params.m2
            };
            color::mul(m, rgb)
        }))
    }
}

/// Viénot, Brettel & Mollon (1999). Single projection plane.
pub struct Vienot;

impl CvdTransform for Vienot {
    fn simulate_cvd(
        &self,
        image: &RgbImage,
        deficiency: Deficiency,
        severity: f64,
    ) -> Result<RgbImage, TransformError> {
        let severity = check_severity(severity)?;
        let m = match deficiency {
            Deficiency::Protan => &VIENOT_PROTAN,
            Deficiency::Deutan => &VIENOT_DEUTAN,
            Deficiency::Tritan => &VIENOT_TRITAN,
        };
        Ok(map_linear(image, severity, |rgb| color::mul(m, rgb)))
    }
}

/// Machado, Oliveira & Fernandes (2009).
///
/// Intermediate severities interpolate the matrix from identity, which is
/// the same as blending the fully simulated pixel.
pub struct Machado;

impl Machado {
    pub fn matrix(deficiency: Deficiency, severity: f32) -> Mat3 {
        let full = match deficiency {
            Deficiency::Protan => &MACHADO_PROTAN,
            Deficiency::Deutan => &MACHADO_DEUTAN,
            Deficiency::Tritan => &MACHADO_TRITAN,
        };
        let mut m = IDENTITY;
        for (out, (id, f)) in m.iter_mut().zip(IDENTITY.iter().zip(full.iter())) {
            *out = id + severity * (f - id);
        }
        m
    }
}

impl CvdTransform for Machado {
    fn simulate_cvd(
        &self,
        image: &RgbImage,
        deficiency: Deficiency,
        severity: f64,
    ) -> Result<RgbImage, TransformError> {
        let severity = check_severity(severity)?;
        let m = Self::matrix(deficiency, severity);
        Ok(map_linear(image, 1.0, |rgb| color::mul(&m, rgb)))
    }
}

/// Picks the most suitable model per call.
///
/// Tritan always uses Brettel. Protan/deutan use Viénot at full severity
/// and Machado for anything partial.
pub struct AutoSelect;

impl CvdTransform for AutoSelect {
    fn simulate_cvd(
        &self,
        image: &RgbImage,
        deficiency: Deficiency,
        severity: f64,
    ) -> Result<RgbImage, TransformError> {
        match deficiency {
            Deficiency::Tritan => Brettel.simulate_cvd(image, deficiency, severity),
            _ if severity >= 1.0 => Vienot.simulate_cvd(image, deficiency, severity),
            _ => Machado.simulate_cvd(image, deficiency, severity),
        }
    }
}

/// Closed mapping from the named algorithm to its transform.
pub fn builtin_transform(algorithm: Algorithm) -> Box<dyn CvdTransform> {
    match algorithm {
        Algorithm::Brettel1997 | Algorithm::Vischeck => Box::new(Brettel),
        Algorithm::Vienot1999 => Box::new(Vienot),
        Algorithm::Machado2009 => Box::new(Machado),
        Algorithm::Auto => Box::new(AutoSelect),
    }
}
