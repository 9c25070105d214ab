// tests/fractional_pooling.rs
// End-to-end tests for the fractional pooling layer running through the
// graph engine: shape behavior, randomness control, and gradients.

use std::collections::HashSet;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use fracpool::backend::Tensor;
use fracpool::graph::GraphEngine;
use fracpool::nn::sampling::{IdentityPermutation, SeededPermutation};
use fracpool::nn::{FractionalPool2d, Module, PoolReduction};
use fracpool::ops::reduction::Mean;

fn iota_image(height: usize, width: usize) -> Tensor<f64> {
    let data: Vec<f64> = (0..height * width).map(|v| v as f64).collect();
    Tensor::from_vec(data, &[1, 1, height, width]).unwrap()
}

fn run_forward(pool: &FractionalPool2d<f64>, input: Tensor<f64>) -> Tensor<f64> {
    let mut engine = GraphEngine::<f64>::new();
    let input = engine.create_variable(input, false);
    let output = pool.forward(&mut engine, input).unwrap();
    engine.get_tensor(output).unwrap().clone()
}

#[test]
fn pooled_shapes_follow_the_ceil_formula() {
    let cases = [
        ((1.0, 1.0), [2, 3, 6, 6], [2, 3, 6, 6]),
        ((1.5, 1.5), [1, 1, 9, 6], [1, 1, 6, 4]),
        ((2.0, 1.25), [4, 2, 8, 5], [4, 2, 4, 4]),
        ((2.0, 2.0), [1, 8, 7, 7], [1, 8, 4, 4]),
    ];
    for (ratio, in_shape, out_shape) in cases {
        let pool = FractionalPool2d::<f64>::new(ratio).unwrap();
        assert_eq!(pool.output_shape(&in_shape).unwrap(), out_shape.to_vec());
        let out = run_forward(&pool, Tensor::randn(&in_shape).unwrap());
        assert_eq!(out.shape(), &out_shape);
    }
}

#[test]
fn seeded_sampling_is_reproducible() {
    let image = iota_image(9, 9);
    let reference = run_forward(
        &FractionalPool2d::<f64>::new((1.5, 1.5))
            .unwrap()
            .with_permutations(Arc::new(SeededPermutation::new(42))),
        image.clone(),
    );
    for _ in 0..5 {
        let pool = FractionalPool2d::<f64>::new((1.5, 1.5))
            .unwrap()
            .with_permutations(Arc::new(SeededPermutation::new(42)));
        let out = run_forward(&pool, image.clone());
        assert_eq!(out.to_vec(), reference.to_vec());
    }
}

#[test]
fn default_sampling_varies_between_calls() {
    // A 5-row axis at ratio 1.5 pools to 4 windows with step multiset
    // {2, 1, 1, 1}, so each axis has 4 equally likely layouts and the joint
    // distribution has 16 outcomes. 50 draws on a gradient image will
    // essentially never collapse to a single output.
    let pool = FractionalPool2d::<f64>::new((1.5, 1.5)).unwrap();
    let image = iota_image(5, 5);
    let mut distinct: HashSet<Vec<u64>> = HashSet::new();
    for _ in 0..50 {
        let out = run_forward(&pool, image.clone());
        distinct.insert(out.to_vec().iter().map(|v| v.to_bits()).collect());
    }
    assert!(distinct.len() >= 2, "sampling produced a single layout");
}

#[test]
fn lazy_mode_defers_evaluation() {
    let pool = FractionalPool2d::<f64>::new((2.0, 2.0))
        .unwrap()
        .with_permutations(Arc::new(IdentityPermutation));
    let mut engine = GraphEngine::<f64>::new();
    engine.lazy_mode();
    let input = engine.create_variable(iota_image(4, 4), false);
    let output = pool.forward(&mut engine, input).unwrap();
    assert!(!engine.is_evaluated(output));

    let out = engine.evaluate(output).unwrap();
    assert_eq!(out.shape(), &[1, 1, 2, 2]);
    assert_eq!(out.to_vec(), vec![5.0, 7.0, 13.0, 15.0]);
}

#[test]
fn min_reduction_picks_window_minima() {
    let pool = FractionalPool2d::with_reduction((2.0, 2.0), PoolReduction::Min)
        .unwrap()
        .with_permutations(Arc::new(IdentityPermutation));
    let out = run_forward(&pool, iota_image(4, 4));
    assert_eq!(out.to_vec(), vec![0.0, 2.0, 8.0, 10.0]);
}

#[test]
fn max_pool_gradient_lands_on_window_maxima() {
    let pool = FractionalPool2d::<f64>::new((2.0, 2.0))
        .unwrap()
        .with_permutations(Arc::new(IdentityPermutation));
    let mut engine = GraphEngine::<f64>::new();
    let input = engine.create_variable(iota_image(4, 4), true);
    let output = pool.forward(&mut engine, input).unwrap();
    let loss = engine
        .apply_operation(Box::new(Mean::new()), vec![output])
        .unwrap();
    engine.backward(loss).unwrap();

    let grad = engine.get_gradient(input).unwrap();
    assert_eq!(grad.shape(), &[1, 1, 4, 4]);
    // Mean over 4 windows sends 1/4 to each window's maximum.
    let expected = [
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.25, 0.0, 0.25, //
        0.0, 0.0, 0.0, 0.0, //
        0.0, 0.25, 0.0, 0.25,
    ];
    for (got, want) in grad.to_vec().into_iter().zip(expected) {
        assert_abs_diff_eq!(got, want, epsilon = 1e-12);
    }
    let total = grad.sum(None, false).unwrap();
    assert_abs_diff_eq!(total.first().unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn mean_pool_gradient_spreads_over_corners() {
    let pool = FractionalPool2d::with_reduction((2.0, 2.0), PoolReduction::Mean)
        .unwrap()
        .with_permutations(Arc::new(IdentityPermutation));
    let mut engine = GraphEngine::<f64>::new();
    let input = engine.create_variable(iota_image(4, 4), true);
    let output = pool.forward(&mut engine, input).unwrap();
    let loss = engine
        .apply_operation(Box::new(Mean::new()), vec![output])
        .unwrap();
    engine.backward(loss).unwrap();

    // Windows tile the image, so every element receives 1 / (4 windows *
    // 4 corners) and the gradient is uniform.
    let grad = engine.get_gradient(input).unwrap();
    for value in grad.to_vec() {
        assert_abs_diff_eq!(value, 1.0 / 16.0, epsilon = 1e-12);
    }
}
