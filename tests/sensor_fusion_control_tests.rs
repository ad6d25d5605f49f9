use rand::rngs::StdRng;
use rand::SeedableRng;
use tanktwin::config::{AmbientSensorConfig, ControlConfig, FusionConfig, RangeSensorConfig};
use tanktwin::sensors::{HardwareStatus, RawDistance, SensorInput};
use tanktwin::*;

fn raw(distance: f64) -> RawDistance {
    RawDistance {
        distance,
        valid: true,
        time_of_flight_s: 0.0,
    }
}

#[test]
fn test_seeded_sensors_are_reproducible() {
    let run = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut range = RangeSensor::new(&RangeSensorConfig::default()).unwrap();
        let mut ambient = AmbientSensor::new(&AmbientSensorConfig::default()).unwrap();

        (0..200)
            .map(|_| {
                let env = ambient.read(&mut rng);
                let reading = range.measure(80.0, env.temperature, env.pressure, &mut rng);
                (env.temperature, env.pressure, reading.distance)
            })
            .collect::<Vec<_>>()
    };

    assert_eq!(run(42), run(42));
    assert_ne!(run(42), run(43));
}

#[test]
fn test_range_readings_stay_near_truth() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut sensor = RangeSensor::new(&RangeSensorConfig::default()).unwrap();

    for _ in 0..1000 {
        let reading = sensor.measure(80.0, 25.0, 1013.0, &mut rng);
        // 120 cm true distance, noise sigma 0.5, erratic echoes up to 10 cm.
        assert!((reading.distance - 120.0).abs() < 10.0 + 5.0 * 0.5);
        assert!(reading.valid);
    }
    assert_eq!(sensor.status(), HardwareStatus::Ok);
}

#[test]
fn test_range_sensor_through_trait() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut sensor = RangeSensor::new(&RangeSensorConfig {
        noise_std_cm: 0.0,
        outlier_probability: 0.0,
        ..RangeSensorConfig::default()
    })
    .unwrap();

    let input = SensorInput {
        level: 150.0,
        temperature: 20.0,
        pressure: 1013.0,
    };
    let reading = sensor.sample(&input, &mut rng);
    assert_eq!(reading.distance, 50.0);
    assert_eq!(sensor.id(), "US-01");
}

#[test]
fn test_ambient_drift_is_a_random_walk() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut sensor = AmbientSensor::new(&AmbientSensorConfig::default()).unwrap();

    for _ in 0..10_000 {
        sensor.read(&mut rng);
    }
    // Step sigma 0.01 over 10k steps: one-sigma spread of 1 °C.
    assert!(sensor.drift() != 0.0);
    assert!(sensor.drift().abs() < 5.0);
}

#[test]
fn test_fusion_smooths_single_outlier() {
    let mut fusion = FusionEngine::new(&FusionConfig::default()).unwrap();
    for _ in 0..5 {
        fusion.fuse(&raw(100.0), 25.0, 1013.0, 200.0);
    }

    // A 10 cm erratic echo moves the fused level by a fifth of that.
    let spiked = fusion.fuse(&raw(90.0), 25.0, 1013.0, 200.0);
    assert_eq!(spiked.instantaneous, 110.0);
    assert!((spiked.value - 102.0).abs() < 1e-9);

    // Flushed out after a full window of clean readings.
    let mut last = spiked;
    for _ in 0..5 {
        last = fusion.fuse(&raw(100.0), 25.0, 1013.0, 200.0);
    }
    assert!((last.value - 100.0).abs() < 1e-9);
    assert_eq!(last.window_len, 5);
}

#[test]
fn test_fusion_window_length_is_bounded() {
    let mut fusion = FusionEngine::new(&FusionConfig {
        window_size: 3,
        ..FusionConfig::default()
    })
    .unwrap();

    for i in 0..10 {
        let fused = fusion.fuse(&raw(f64::from(i)), 25.0, 1013.0, 200.0);
        assert_eq!(fused.window_len, (i as usize + 1).min(3));
    }
    assert_eq!(fusion.window().collect::<Vec<_>>(), vec![193.0, 192.0, 191.0]);
}

#[test]
fn test_control_low_alarm_sequence() {
    let mut controller = HysteresisController::new(&ControlConfig::default()).unwrap();

    let modes: Vec<AlarmMode> = [35.0, 29.0, 31.0, 31.0]
        .iter()
        .map(|&level| {
            controller.evaluate(level);
            controller.mode()
        })
        .collect();
    assert_eq!(
        modes,
        vec![
            AlarmMode::Normal,
            AlarmMode::LowAlarm,
            AlarmMode::LowAlarm,
            AlarmMode::LowAlarm
        ]
    );

    // Release once the level clears the threshold plus the hysteresis margin.
    assert_eq!(controller.evaluate(35.0), ControlAction::Maintain);
    assert_eq!(controller.mode(), AlarmMode::Normal);
}

#[test]
fn test_control_high_alarm_sequence() {
    let mut controller = HysteresisController::new(&ControlConfig::default()).unwrap();

    assert_eq!(controller.evaluate(175.0), ControlAction::ActivateOutflow);
    assert_eq!(controller.evaluate(168.0), ControlAction::ActivateOutflow);
    assert_eq!(controller.mode(), AlarmMode::HighAlarm);
    assert_eq!(controller.evaluate(165.0), ControlAction::Maintain);
    assert_eq!(controller.mode(), AlarmMode::Normal);

    // 168 from NORMAL is inside the band and does not raise an alarm.
    assert_eq!(controller.evaluate(168.0), ControlAction::Maintain);
    assert_eq!(controller.get_state().transitions, 2);
}

#[test]
fn test_control_rejects_inverted_thresholds() {
    let inverted = ControlConfig {
        low_threshold_cm: 170.0,
        high_threshold_cm: 30.0,
        ..ControlConfig::default()
    };
    assert!(matches!(
        HysteresisController::new(&inverted),
        Err(ConfigError::InvertedThresholds { .. })
    ));
}
