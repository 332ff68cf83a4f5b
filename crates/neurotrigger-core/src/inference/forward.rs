//! 浮動小数点の参照 forward
//!
//! 各層の入力末尾にバイアス入力（値 1）を付け、活性化は `tanh(x / 2)`。
//! 固定小数点版の比較基準。

use crate::expert::weight_offset;

/// 活性化関数
#[inline]
pub fn activation(x: f32) -> f32 {
    (x / 2.0).tanh()
}

/// 全層の順伝播
///
/// # Panics
///
/// `input.len() != layer_sizes[0]` のとき、または重み数がトポロジーと一致しないとき。
pub fn forward_float(layer_sizes: &[usize], weights: &[f32], input: &[f32]) -> Vec<f32> {
    assert_eq!(input.len(), layer_sizes[0], "input width mismatch");

    let mut x = input.to_vec();
    for layer in 0..layer_sizes.len() - 1 {
        let n_in = layer_sizes[layer];
        let n_out = layer_sizes[layer + 1];

        let y: Vec<f32> = (0..n_out)
            .map(|out| {
                let row = &weights[weight_offset(layer_sizes, layer, out, 0)..][..=n_in];
                let (w, bias) = row.split_at(n_in);
                let sum: f32 = w.iter().zip(&x).map(|(w, x)| w * x).sum::<f32>() + bias[0];
                activation(sum)
            })
            .collect();
        x = y;
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expert::n_weights;

    #[test]
    fn test_zero_weights_give_zero() {
        let sizes = [27, 5, 2];
        let weights = vec![0.0f32; n_weights(&sizes)];
        let out = forward_float(&sizes, &weights, &[0.3; 27]);
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_bias_only_network() {
        // 1 → 1: w = 0, bias = 2 → tanh(1)
        let sizes = [1, 1];
        let out = forward_float(&sizes, &[0.0, 2.0], &[0.7]);
        assert!((out[0] - 1.0f32.tanh()).abs() < 1e-7);
    }

    #[test]
    fn test_weight_order_output_then_input() {
        // 2 → 2: out0 = [1, 0, 0], out1 = [0, -2, 0]
        let sizes = [2, 2];
        let weights = [1.0, 0.0, 0.0, 0.0, -2.0, 0.0];
        let out = forward_float(&sizes, &weights, &[0.5, 0.25]);
        assert!((out[0] - 0.25f32.tanh()).abs() < 1e-7);
        assert!((out[1] - (-0.25f32).tanh()).abs() < 1e-7);
    }

    #[test]
    #[should_panic(expected = "input width mismatch")]
    fn test_input_width_contract() {
        let sizes = [27, 2];
        let weights = vec![0.0f32; n_weights(&sizes)];
        forward_float(&sizes, &weights, &[0.0; 26]);
    }
}
