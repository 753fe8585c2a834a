// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 解码用数值运算: 单精度位技巧指数近似及其派生函数。
// 近似公式与模型训练侧保持一致, 不要替换为std的exp。

/// 单精度快速指数近似
///
/// 把 `(1<<23) * (1.4426950409*x + 126.93490512)` 直接解释为float位模式。
/// 相对误差约2%, 对置信度阈值判定足够。
#[inline]
pub fn fast_exp(x: f32) -> f32 {
    let bits = ((1u32 << 23) as f64 * (1.442_695_040_9 * x as f64 + 126.934_905_12)) as u32;
    f32::from_bits(bits)
}

/// 基于fast_exp的sigmoid
#[inline]
pub fn fast_sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + fast_exp(-x))
}

/// 热力图关键点偏移用的混合指数:
/// |v| < 1 时线性段 v*e, 否则保号的fast_exp。
#[inline]
pub fn hybrid_exp(v: f32) -> f32 {
    let gate = 1.0f32;
    if v.abs() < gate {
        return v * std::f32::consts::E;
    }
    if v > 0.0 {
        fast_exp(v)
    } else {
        -fast_exp(-v)
    }
}

/// 数值稳定softmax
pub fn softmax(x: &[f32]) -> Vec<f32> {
    let max_val = x.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = x.iter().map(|&v| (v - max_val).exp()).sum();
    x.iter().map(|&v| (v - max_val).exp() / exp_sum).collect()
}

/// DFL解码: 对单边分布求期望 Σ k·p_k
pub fn dfl_expectation(dis: &[f32]) -> f32 {
    let mut distance = 0.0;
    for (i, &prob) in dis.iter().enumerate() {
        distance += i as f32 * prob;
    }
    distance
}
