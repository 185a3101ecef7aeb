use crate::core::grid_loc::GridLoc;
use crate::core::params::{FieldSpec, FoldLimits, InterpKernel};
use crate::types::Volume;
use std::f64::consts::PI;

/// How a field's contributors are combined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldMode {
    Continuous,
    /// Value of the highest-weight contributor with data
    Discrete,
    /// Weighted mean on the circle between the fold limits
    Folded(FoldLimits),
}

/// One field to interpolate
#[derive(Debug, Clone, PartialEq)]
pub struct FieldJob {
    pub name: String,
    /// Row of the field in each ray's data
    pub index: usize,
    pub mode: FieldMode,
}

impl FieldJob {
    pub fn new(name: &str, index: usize, spec: Option<&FieldSpec>) -> Self {
        let mode = match spec {
            Some(s) if s.discrete => FieldMode::Discrete,
            Some(FieldSpec { fold: Some(limits), .. }) => FieldMode::Folded(*limits),
            _ => FieldMode::Continuous,
        };
        Self { name: name.to_string(), index, mode }
    }
}

/// Settings shared by every cell of an INTERP pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulateParams {
    pub kernel: InterpKernel,
    pub min_valid: usize,
    pub missing_value: f32,
}

/// Interpolated value of one field at one cell
pub fn accumulate_cell(loc: &GridLoc, volume: &Volume, job: &FieldJob, params: &AccumulateParams) -> f32 {
    let rays = volume.rays();
    let valid = loc.contributions().iter().filter_map(|c| {
        let v = rays[c.ray as usize].gate_value(job.index, c.gate as usize);
        if volume.is_valid(v) {
            Some((v as f64, c.weight as f64))
        } else {
            None
        }
    });

    if params.kernel == InterpKernel::Nearest || job.mode == FieldMode::Discrete {
        let mut n_valid = 0;
        let mut first = None;
        for (v, _) in valid {
            n_valid += 1;
            first.get_or_insert(v);
        }
        return match first {
            Some(v) if n_valid >= params.min_valid => v as f32,
            _ => params.missing_value,
        };
    }

    let mut n_valid = 0;
    let mut sum_w = 0.0;
    let mut sum_v = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for (v, w) in valid {
        n_valid += 1;
        sum_w += w;
        match job.mode {
            FieldMode::Folded(limits) => {
                let angle = to_angle(v, &limits);
                sum_x += w * angle.cos();
                sum_y += w * angle.sin();
            }
            _ => sum_v += w * v,
        }
    }

    if n_valid == 0 || n_valid < params.min_valid || sum_w <= 0.0 {
        return params.missing_value;
    }

    match job.mode {
        FieldMode::Folded(limits) => from_angle(sum_y.atan2(sum_x), &limits) as f32,
        _ => (sum_v / sum_w) as f32,
    }
}

/// Map a folded value onto (-pi, pi]
fn to_angle(value: f64, limits: &FoldLimits) -> f64 {
    (value - limits.lower) / (limits.upper - limits.lower) * 2.0 * PI - PI
}

fn from_angle(angle: f64, limits: &FoldLimits) -> f64 {
    limits.lower + (angle + PI) / (2.0 * PI) * (limits.upper - limits.lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RadarSite, Ray, MISSING_VALUE};
    use approx::assert_abs_diff_eq;
    use chrono::Utc;
    use ndarray::Array2;

    fn volume(values: &[f32]) -> Volume {
        let rays = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Ray::new(i as f64, 0.5, 1.0, 1.0, Utc::now(), Array2::from_elem((1, 4), v)))
            .collect();
        Volume::new(RadarSite::new(0.0, 0.0, 0.0), vec!["F".into()], rays).unwrap()
    }

    fn params(kernel: InterpKernel, min_valid: usize) -> AccumulateParams {
        AccumulateParams { kernel, min_valid, missing_value: MISSING_VALUE }
    }

    fn job(mode: FieldMode) -> FieldJob {
        FieldJob { name: "F".into(), index: 0, mode }
    }

    #[test]
    fn test_weighted_mean_skips_missing() {
        let vol = volume(&[10.0, 20.0, MISSING_VALUE]);
        let loc = GridLoc::from_weights(vec![(0, 0, 1.0), (1, 0, 3.0), (2, 0, 4.0)]);
        let v = accumulate_cell(&loc, &vol, &job(FieldMode::Continuous), &params(InterpKernel::Linear, 1));
        assert_abs_diff_eq!(v, 17.5, epsilon = 1e-4);

        let v = accumulate_cell(&loc, &vol, &job(FieldMode::Continuous), &params(InterpKernel::Linear, 3));
        assert_eq!(v, MISSING_VALUE);
    }

    #[test]
    fn test_nearest_and_discrete_take_top_valid() {
        let vol = volume(&[10.0, f32::NAN, 30.0]);
        let loc = GridLoc::from_weights(vec![(0, 0, 1.0), (1, 0, 5.0), (2, 0, 2.0)]);
        let v = accumulate_cell(&loc, &vol, &job(FieldMode::Continuous), &params(InterpKernel::Nearest, 1));
        assert_eq!(v, 30.0);
        let v = accumulate_cell(&loc, &vol, &job(FieldMode::Discrete), &params(InterpKernel::Linear, 1));
        assert_eq!(v, 30.0);
    }

    #[test]
    fn test_folded_mean_wraps() {
        let vol = volume(&[-9.0, 9.0]);
        let loc = GridLoc::from_weights(vec![(0, 0, 1.0), (1, 0, 1.0)]);
        let limits = FoldLimits { lower: -10.0, upper: 10.0 };
        let v = accumulate_cell(&loc, &vol, &job(FieldMode::Folded(limits)), &params(InterpKernel::Linear, 1));
        // -9 and 9 are 2 apart across the fold: mean sits at the fold, not at 0
        assert!(v.abs() > 9.9, "got {}", v);
    }

    #[test]
    fn test_empty_loc_is_missing() {
        let vol = volume(&[1.0]);
        let v = accumulate_cell(&GridLoc::missing(), &vol, &job(FieldMode::Continuous), &params(InterpKernel::Linear, 1));
        assert_eq!(v, MISSING_VALUE);
    }

    #[test]
    fn test_field_job_modes() {
        assert_eq!(FieldJob::new("PID", 0, Some(&FieldSpec::discrete("PID"))).mode, FieldMode::Discrete);
        assert!(matches!(
            FieldJob::new("VEL", 1, Some(&FieldSpec::folded("VEL", -8.0, 8.0))).mode,
            FieldMode::Folded(_)
        ));
        assert_eq!(FieldJob::new("DBZ", 2, None).mode, FieldMode::Continuous);
    }
}
