//! Integration tests for gammalss.

use approx::assert_relative_eq;
use gammalss::distributions::{DistributionClassArgs, DistributionInfo, ParamDict};
use gammalss::prelude::*;
use ndarray::{Array1, Array2, array};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as RandDistribution, Gamma as RandGamma};

fn gamma_sample(concentration: f64, rate: f64, n: usize, seed: u64) -> Array1<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let dist = RandGamma::new(concentration, 1.0 / rate).unwrap();
    Array1::from_iter((0..n).map(|_| dist.sample(&mut rng)))
}

fn raw_nll(dist: &DistributionClass, raw: &Array2<f64>, y: &Array1<f64>) -> f64 {
    let target = ResponseData::Univariate(&y.view());
    dist.metric_fn(&raw.view(), &target).unwrap().1
}

#[test]
fn test_gamma_exp_workflow() {
    let gamma = Gamma::from_strs("None", "exp").unwrap();
    let dist = gamma.dist_class();

    assert_eq!(dist.n_dist_param(), 2);
    assert_eq!(dist.distribution_arg_names(), ["concentration", "rate"]);
    assert!(dist.is_univariate());
    assert!(!dist.is_discrete());
    assert_eq!(dist.stabilization(), Stabilization::None);
    assert!(dist.param_dict().values().all(|f| *f == ResponseFn::Exp));
    assert!(dist.param_dict_inv().values().all(|f| *f == InverseResponseFn::Log));
}

#[test]
fn test_gamma_softplus_workflow() {
    let gamma = Gamma::from_strs("MAD", "softplus").unwrap();
    let dist = gamma.dist_class();

    assert_eq!(dist.stabilization(), Stabilization::Mad);
    assert!(dist.param_dict().values().all(|f| *f == ResponseFn::Softplus));
    assert!(
        dist.param_dict_inv()
            .values()
            .all(|f| *f == InverseResponseFn::SoftplusInv)
    );
    assert_eq!(
        dist.param_dict().keys().collect::<Vec<_>>(),
        vec!["concentration", "rate"]
    );
}

#[test]
fn test_gamma_rejects_unknown_response_fn() {
    for name in ["foo", "Exp", "log", ""] {
        let result = Gamma::from_strs("None", name);
        assert!(matches!(result, Err(LssError::InvalidParameter(_))), "{name}");
    }
}

#[test]
fn test_gamma_rejects_unknown_stabilization() {
    let result = Gamma::from_strs("mad", "exp");
    assert!(matches!(result, Err(LssError::InvalidParameter(_))));
}

#[test]
fn test_gamma_from_config() {
    let config = GammaConfig::from_json(r#"{"stabilization": "L2"}"#).unwrap();
    let gamma = Gamma::from_config(&config);
    assert_eq!(gamma.dist_class().stabilization(), Stabilization::L2);
    assert_eq!(
        gamma.dist_class().param_dict().get("rate"),
        Some(&ResponseFn::Exp)
    );
}

#[test]
fn test_gradients_match_finite_differences() {
    let y = array![0.4, 1.3, 2.8, 0.9];
    let raw = array![[0.3, -0.2], [1.1, 0.4], [0.0, 0.0], [-0.5, 0.7]];
    let h = 1e-4;

    for response_fn in [ResponseFn::Exp, ResponseFn::Softplus] {
        let dist = Gamma::new(Stabilization::None, response_fn).into_dist_class();
        let target = ResponseData::Univariate(&y.view());
        let derivs = dist
            .compute_gradients_and_hessians(&raw.view(), &target, None)
            .unwrap();

        for i in 0..raw.nrows() {
            for j in 0..2 {
                let row_nll = |delta: f64| {
                    let mut r = raw.row(i).to_owned().insert_axis(ndarray::Axis(0));
                    r[[0, j]] += delta;
                    raw_nll(&dist, &r, &array![y[i]])
                };
                let (plus, center, minus) = (row_nll(h), row_nll(0.0), row_nll(-h));

                let grad = (plus - minus) / (2.0 * h);
                let hess = (plus - 2.0 * center + minus) / (h * h);
                assert_relative_eq!(derivs.gradients[[i, j]], grad, epsilon = 1e-5);
                assert_relative_eq!(derivs.hessians[[i, j]], hess, epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn test_rate_hessian_is_positive_under_exp() {
    // With exp response the rate hessian reduces to y * rate.
    let dist = Gamma::default().into_dist_class();
    let y = array![0.5, 2.0];
    let raw = array![[0.0, 0.0], [0.5, 1.0]];
    let target = ResponseData::Univariate(&y.view());
    let derivs = dist
        .compute_gradients_and_hessians(&raw.view(), &target, None)
        .unwrap();

    let rate = dist.transform_params(&raw.view()).unwrap().column(1).to_owned();
    for i in 0..2 {
        assert_relative_eq!(derivs.hessians[[i, 1]], y[i] * rate[i], epsilon = 1e-4);
    }
}

#[test]
fn test_weights_scale_derivatives() {
    let dist = Gamma::default().into_dist_class();
    let y = array![1.0, 2.0, 3.0];
    let raw = array![[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]];
    let weights = array![1.0, 2.0, 0.0];
    let target = ResponseData::Univariate(&y.view());

    let plain = dist
        .compute_gradients_and_hessians(&raw.view(), &target, None)
        .unwrap();
    let weighted = dist
        .compute_gradients_and_hessians(&raw.view(), &target, Some(&weights.view()))
        .unwrap();

    for i in 0..3 {
        for j in 0..2 {
            assert_relative_eq!(
                weighted.gradients[[i, j]],
                plain.gradients[[i, j]] * weights[i]
            );
            assert_relative_eq!(
                weighted.hessians[[i, j]],
                plain.hessians[[i, j]] * weights[i]
            );
        }
    }
}

#[test]
fn test_stabilization_methods() {
    let y = gamma_sample(2.0, 1.0, 200, 7);
    let raw = Array2::from_elem((200, 2), 0.2);
    let target = ResponseData::Univariate(&y.view());

    let l2 = Gamma::new(Stabilization::L2, ResponseFn::Exp).into_dist_class();
    let derivs = l2
        .compute_gradients_and_hessians(&raw.view(), &target, None)
        .unwrap();
    for col in derivs.gradients.columns() {
        let rms = (col.iter().map(|v| v * v).sum::<f64>() / col.len() as f64).sqrt();
        assert_relative_eq!(rms, 1.0, epsilon = 1e-9);
    }

    let mad = Gamma::new(Stabilization::Mad, ResponseFn::Exp).into_dist_class();
    let derivs = mad
        .compute_gradients_and_hessians(&raw.view(), &target, None)
        .unwrap();
    assert!(derivs.gradients.iter().all(|v| v.is_finite()));
    assert!(derivs.hessians.iter().all(|v| v.is_finite()));
}

#[test]
fn test_zero_target_gradient_is_replaced() {
    // ln(0) makes the concentration gradient non-finite; it falls back to the column mean.
    let dist = Gamma::default().into_dist_class();
    let y = array![0.0, 1.0, 2.0];
    let raw = Array2::zeros((3, 2));
    let target = ResponseData::Univariate(&y.view());
    let derivs = dist
        .compute_gradients_and_hessians(&raw.view(), &target, None)
        .unwrap();

    assert!(derivs.gradients.iter().all(|v| v.is_finite()));
    let expected = (derivs.gradients[[1, 0]] + derivs.gradients[[2, 0]]) / 2.0;
    assert_relative_eq!(derivs.gradients[[0, 0]], expected, epsilon = 1e-12);
}

#[test]
fn test_shape_errors() {
    let dist = Gamma::default().into_dist_class();
    let y = array![1.0, 2.0];
    let target = ResponseData::Univariate(&y.view());

    let wrong_rows = Array2::zeros((3, 2));
    assert!(matches!(
        dist.compute_gradients_and_hessians(&wrong_rows.view(), &target, None),
        Err(LssError::ShapeMismatch { .. })
    ));

    let raw = Array2::zeros((2, 2));
    let weights = array![1.0];
    assert!(matches!(
        dist.compute_gradients_and_hessians(&raw.view(), &target, Some(&weights.view())),
        Err(LssError::ShapeMismatch { .. })
    ));

    let y2 = array![[1.0, 2.0], [3.0, 4.0]];
    let multivariate = ResponseData::Multivariate(&y2.view());
    assert!(matches!(
        dist.nll(&raw.view(), &multivariate),
        Err(LssError::InvalidInput(_))
    ));
}

#[test]
fn test_transform_roundtrip() {
    let params = array![[0.5, 2.0], [3.0, 0.25]];
    for response_fn in [ResponseFn::Exp, ResponseFn::Softplus] {
        let dist = Gamma::new(Stabilization::None, response_fn).into_dist_class();
        let raw = dist.inverse_transform_params(&params.view()).unwrap();
        let back = dist.transform_params(&raw.view()).unwrap();
        for (a, b) in back.iter().zip(params.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-5);
        }
    }
}

#[test]
fn test_start_values_improve_on_moments() {
    let y = gamma_sample(3.0, 2.0, 2000, 42);
    let dist = Gamma::default().into_dist_class();
    let target = ResponseData::Univariate(&y.view());

    let (loss, start) = dist.calculate_start_values(&target, &StartValueConfig::default()).unwrap();
    assert_eq!(start.len(), 2);
    assert!(start.iter().all(|v| v.is_finite()));

    let moments = dist.family().moment_estimates(&y.view());
    let moment_params = Array2::from_shape_fn((y.len(), 2), |(_, j)| moments[j]);
    let moment_loss = dist.nll(&moment_params.view(), &target).unwrap();
    assert!(loss <= moment_loss + 1e-2);

    let fitted = dist
        .transform_params(&start.view().insert_axis(ndarray::Axis(0)))
        .unwrap();
    let implied_mean = fitted[[0, 0]] / fitted[[0, 1]];
    let sample_mean = y.mean().unwrap();
    assert_relative_eq!(implied_mean, sample_mean, epsilon = 0.05);
    assert_relative_eq!(fitted[[0, 0]], 3.0, epsilon = 0.5);
}

#[test]
fn test_start_values_empty_target() {
    let dist = Gamma::default().into_dist_class();
    let y: Array1<f64> = Array1::zeros(0);
    let target = ResponseData::Univariate(&y.view());
    assert!(matches!(
        dist.calculate_start_values(&target, &StartValueConfig { max_iter: 10 }),
        Err(LssError::InvalidInput(_))
    ));
}

#[test]
fn test_predict_parameters_and_samples() {
    let dist = Gamma::default().into_dist_class();
    let params = array![[2.0, 1.0], [6.0, 3.0]];
    let raw = dist.inverse_transform_params(&params.view()).unwrap();
    let config = PredictConfig {
        n_samples: 4000,
        ..PredictConfig::default()
    };

    match dist.predict_dist(&raw.view(), PredType::Parameters, &config) {
        Ok(PredictionOutput::Parameters(p)) => {
            assert_relative_eq!(p[[1, 0]], 6.0, epsilon = 1e-5);
        }
        other => panic!("unexpected output: {other:?}"),
    }

    match dist.predict_dist(&raw.view(), PredType::Samples, &config) {
        Ok(PredictionOutput::Samples(s)) => {
            assert_eq!(s.dim(), (4000, 2));
            let mean_0 = s.column(0).mean().unwrap();
            let mean_1 = s.column(1).mean().unwrap();
            assert_relative_eq!(mean_0, 2.0, epsilon = 0.15);
            assert_relative_eq!(mean_1, 2.0, epsilon = 0.15);
        }
        other => panic!("unexpected output: {other:?}"),
    }

    // Same seed, same draws.
    let a = dist.draw_samples(&params.view(), 10, 9).unwrap();
    let b = dist.draw_samples(&params.view(), 10, 9).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_predict_quantiles() {
    let dist = Gamma::new(Stabilization::None, ResponseFn::Softplus).into_dist_class();
    let params = array![[3.0, 2.0], [1.0, 0.5]];
    let raw = dist.inverse_transform_params(&params.view()).unwrap();
    let config = PredictConfig {
        n_samples: 5000,
        quantiles: vec![0.1, 0.5, 0.9],
        seed: 11,
    };

    let quantiles = match dist.predict_dist(&raw.view(), PredType::Quantiles, &config) {
        Ok(PredictionOutput::Quantiles(q)) => q,
        other => panic!("unexpected output: {other:?}"),
    };
    assert_eq!(quantiles.dim(), (2, 3));
    for row in quantiles.rows() {
        assert!(row[0] <= row[1] && row[1] <= row[2]);
    }

    let exact_median = dist.family().quantile(&[3.0, 2.0], 0.5);
    assert_relative_eq!(quantiles[[0, 1]], exact_median, epsilon = 0.1);

    let bad = PredictConfig {
        quantiles: vec![1.5],
        ..config
    };
    assert!(matches!(
        dist.predict_dist(&raw.view(), PredType::Quantiles, &bad),
        Err(LssError::InvalidParameter(_))
    ));
}

#[test]
fn test_predict_distribution_info() {
    let dist = Gamma::default().into_dist_class();
    let raw = Array2::zeros((3, 2));
    let info: DistributionInfo =
        match dist.predict_dist(&raw.view(), PredType::Distribution, &PredictConfig::default()) {
            Ok(PredictionOutput::Distribution(info)) => info,
            other => panic!("unexpected output: {other:?}"),
        };

    assert_eq!(info.dist_name, "Gamma");
    assert_eq!(info.param_names, vec!["concentration", "rate"]);
    assert!(info.is_univariate);
    assert!(!info.is_discrete);
    assert_eq!(info.params.dim(), (3, 2));
    assert!(info.params.iter().all(|&p| p == 1.0 + 1e-6));
}

#[test]
fn test_single_column_input_is_rejected() {
    let dist = Gamma::default().into_dist_class();
    let narrow = Array2::from_elem((2, 1), 1.0);
    let is_shape_err = |r: Result<Array2<f64>>| matches!(r, Err(LssError::ShapeMismatch { .. }));

    assert!(is_shape_err(dist.transform_params(&narrow.view())));
    assert!(is_shape_err(dist.inverse_transform_params(&narrow.view())));
    assert!(is_shape_err(dist.draw_samples(&narrow.view(), 5, 1)));
    assert!(matches!(
        dist.predict_dist(&narrow.view(), PredType::Samples, &PredictConfig::default()),
        Err(LssError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        dist.log_prob(&[1.0], 1.0),
        Err(LssError::ShapeMismatch { .. })
    ));
    assert_relative_eq!(
        dist.log_prob(&[2.0, 1.0], 1.0).unwrap(),
        dist.family().log_prob(&[2.0, 1.0], 1.0)
    );
}

#[test]
fn test_raw_from_flat() {
    let dist = Gamma::default().into_dist_class();
    // Parameter-major: all concentrations, then all rates.
    let flat = array![1.0, 2.0, 3.0, 10.0, 20.0, 30.0];
    let raw = dist.raw_from_flat(&flat.view(), 3).unwrap();
    assert_eq!(raw, array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);

    assert!(matches!(
        dist.raw_from_flat(&flat.view(), 4),
        Err(LssError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_distribution_class_validation() {
    let base = || DistributionClassArgs {
        distribution: Box::new(GammaFamily {}),
        univariate: true,
        discrete: false,
        n_dist_param: 2,
        stabilization: Stabilization::None,
        param_dict: [("concentration", ResponseFn::Exp), ("rate", ResponseFn::Exp)]
            .into_iter()
            .collect(),
        param_dict_inv: [
            ("concentration", InverseResponseFn::Log),
            ("rate", InverseResponseFn::Log),
        ]
        .into_iter()
        .collect(),
        distribution_arg_names: vec!["concentration".to_string(), "rate".to_string()],
    };

    assert!(DistributionClass::new(base()).is_ok());

    let mut wrong_count = base();
    wrong_count.n_dist_param = 3;
    assert!(matches!(
        DistributionClass::new(wrong_count),
        Err(LssError::InvalidParameter(_))
    ));

    let mut wrong_order = base();
    wrong_order.distribution_arg_names.reverse();
    assert!(DistributionClass::new(wrong_order).is_err());

    let mut wrong_inv = base();
    wrong_inv.param_dict_inv = ParamDict::from_iter([("shape", InverseResponseFn::Log)]);
    assert!(DistributionClass::new(wrong_inv).is_err());
}

#[test]
fn test_dist_class_json_roundtrip() {
    let dist = Gamma::new(Stabilization::L2, ResponseFn::Softplus).into_dist_class();
    let json = dist.to_json().unwrap();
    assert!(json.contains("\"L2\""));
    assert!(json.contains("softplus"));

    let restored = DistributionClass::from_json(&json).unwrap();
    assert_eq!(restored.stabilization(), Stabilization::L2);
    assert_eq!(restored.family().name(), "Gamma");
    assert_eq!(
        restored.param_dict_inv().get("concentration"),
        Some(&InverseResponseFn::SoftplusInv)
    );

    assert!(matches!(
        DistributionClass::from_json("{not json"),
        Err(LssError::SerializationError(_))
    ));
}

#[test]
fn test_deserialize_rejects_inconsistent_handler() {
    let dist = Gamma::default().into_dist_class();
    let json = dist.to_json().unwrap();
    let broken = json.replace("\"n_dist_param\":2", "\"n_dist_param\":1");
    assert_ne!(broken, json);

    assert!(serde_json::from_str::<DistributionClass>(&broken).is_err());
    let err = DistributionClass::from_json(&broken).unwrap_err();
    assert!(err.to_string().contains("n_dist_param"));
}

#[test]
fn test_config_rejects_unknown_names() {
    let err = GammaConfig::from_json(r#"{"response_fn": "foo"}"#).unwrap_err();
    assert!(matches!(err, LssError::InvalidParameter(_)));

    let config = GammaConfig::from_json(r#"{"response_fn": "softplus"}"#).unwrap();
    let dist = Gamma::from_config(&config).into_dist_class();
    assert_eq!(dist.param_dict().get("rate"), Some(&ResponseFn::Softplus));
}
