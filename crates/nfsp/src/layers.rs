//! Layer construction and activations shared by every network component.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{Conv1d, Conv1dConfig, Init, Linear, VarBuilder, VarMap};

use crate::NfspError;

const SELU_ALPHA: f64 = 1.673_263_242_354_377_3;
const SELU_SCALE: f64 = 1.050_700_987_355_480_5;

/// Scaled exponential linear unit, built from differentiable primitives.
pub(crate) fn selu(x: &Tensor) -> Result<Tensor, candle_core::Error> {
    let positive = x.relu()?;
    // min(x, 0)
    let negative = x.neg()?.relu()?.neg()?;
    let saturated = negative.exp()?.affine(SELU_ALPHA, -SELU_ALPHA)?;
    positive.add(&saturated)?.affine(SELU_SCALE, 0.0)
}

/// Dropout that keeps SELU activations at zero mean and unit variance.
///
/// Dropped units are set to the negative saturation value of SELU, then the
/// whole tensor is rescaled. Identity when `train` is false or `rate` is 0.
pub(crate) fn alpha_dropout(
    x: &Tensor,
    rate: f64,
    train: bool,
) -> Result<Tensor, candle_core::Error> {
    if !train || rate == 0.0 {
        return Ok(x.clone());
    }
    let saturation = -SELU_SCALE * SELU_ALPHA;
    let a = ((1.0 - rate) * (1.0 + rate * saturation * saturation)).powf(-0.5);
    let b = -a * saturation * rate;

    let keep = Tensor::rand(0f32, 1f32, x.shape(), x.device())?
        .ge(rate as f32)?
        .to_dtype(x.dtype())?;
    let dropped = keep.affine(-saturation, saturation)?;
    x.mul(&keep)?.add(&dropped)?.affine(a, b)
}

/// Linear layer with weights drawn from `N(0, 1/sqrt(fan_in))`.
pub(crate) fn lecun_linear(
    in_dim: usize,
    out_dim: usize,
    vb: VarBuilder,
) -> Result<Linear, candle_core::Error> {
    let bound = 1.0 / (in_dim as f64).sqrt();
    let ws = vb.get_with_hints(
        (out_dim, in_dim),
        "weight",
        Init::Randn {
            mean: 0.0,
            stdev: bound,
        },
    )?;
    let bs = vb.get_with_hints(
        out_dim,
        "bias",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    Ok(Linear::new(ws, Some(bs)))
}

/// 1-d convolution with weights drawn from `N(0, 1/sqrt(in_channels * kernel))`.
pub(crate) fn lecun_conv1d(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    config: Conv1dConfig,
    vb: VarBuilder,
) -> Result<Conv1d, candle_core::Error> {
    let bound = 1.0 / ((in_channels * kernel) as f64).sqrt();
    let ws = vb.get_with_hints(
        (out_channels, in_channels, kernel),
        "weight",
        Init::Randn {
            mean: 0.0,
            stdev: bound,
        },
    )?;
    let bs = vb.get_with_hints(
        out_channels,
        "bias",
        Init::Uniform {
            lo: -bound,
            up: bound,
        },
    )?;
    Ok(Conv1d::new(ws, Some(bs), config))
}

/// A fresh `VarMap` together with an f32 builder over it.
pub(crate) fn fresh_varmap(device: &Device) -> (VarMap, VarBuilder<'static>) {
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, device);
    (varmap, vs)
}

/// Snapshot of `(prefix.name, var)` pairs held by a `VarMap`.
pub(crate) fn named_vars(varmap: &VarMap, prefix: &str) -> Result<Vec<(String, Var)>, NfspError> {
    let data = varmap
        .data()
        .lock()
        .map_err(|e| NfspError::SyncFailed(format!("failed to lock VarMap: {e}")))?;
    let mut vars: Vec<(String, Var)> = data
        .iter()
        .map(|(name, var)| (format!("{prefix}.{name}"), var.clone()))
        .collect();
    vars.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(vars)
}
