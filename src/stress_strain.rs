use nalgebra::DVector;

/// Mean of the diagonal components of a Mandel stensor of any size.
pub fn volumetric(mandel: &DVector<f64>) -> f64 {
    (mandel[0] + mandel[1] + mandel[2]) / 3.0
}

pub fn add_volumetric(mandel: &mut DVector<f64>, p: f64) {
    mandel[0] += p;
    mandel[1] += p;
    mandel[2] += p;
}

pub fn deviatoric(mandel: &DVector<f64>) -> DVector<f64> {
    let p = volumetric(mandel);
    let mut dev = mandel.clone();
    add_volumetric(&mut dev, -p);
    dev
}

pub fn mandel_decomposition(mandel: &DVector<f64>) -> (f64, DVector<f64>) {
    let p = volumetric(mandel);
    let mut dev = mandel.clone();
    add_volumetric(&mut dev, -p);
    (p, dev)
}

/// von Mises equivalent of a Mandel stensor.
pub fn von_mises(mandel: &DVector<f64>) -> f64 {
    let dev = deviatoric(mandel);
    (1.5 * dev.norm_squared()).sqrt()
}
