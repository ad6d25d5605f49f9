use tanktwin::config::TankConfig;
use tanktwin::tank::PhysicalTank;
use tanktwin::ConfigError;

fn tank(inflow_lpm: f64, outflow_lpm: f64, initial_level_cm: f64) -> PhysicalTank {
    PhysicalTank::new(&TankConfig {
        max_height_cm: 200.0,
        diameter_cm: 100.0,
        initial_level_cm,
        inflow_rate_lpm: inflow_lpm,
        outflow_rate_lpm: outflow_lpm,
        inflow_enabled: true,
        outflow_enabled: true,
    })
    .unwrap()
}

#[test]
fn test_filling_tank_rises_monotonically() {
    let mut tank = tank(10.0, 0.0, 50.0);
    tank.set_outflow(false);

    let mut previous = tank.level();
    for _ in 0..20 {
        let level = tank.step(0.5);
        assert!(level > previous, "level {} did not rise above {}", level, previous);
        assert!(level < 200.0);
        previous = level;
    }

    // 10 L/min over a 100 cm bore: ~0.0212 cm/s for 10 s.
    let expected = 50.0 + 10.0 * 1000.0 / 60.0 / (std::f64::consts::PI * 2500.0) * 10.0;
    assert!((tank.level() - expected).abs() < 1e-9);
}

#[test]
fn test_balanced_flows_hold_level() {
    let mut tank = tank(4.0, 4.0, 120.0);
    for _ in 0..1000 {
        tank.step(0.1);
    }
    assert_eq!(tank.level(), 120.0);
    assert_eq!(tank.net_level_rate(), 0.0);
}

#[test]
fn test_level_stays_within_bounds_over_long_runs() {
    let mut filling = tank(600.0, 0.0, 195.0);
    let mut draining = tank(0.0, 600.0, 5.0);

    for _ in 0..500 {
        let up = filling.step(1.0);
        let down = draining.step(1.0);
        assert!((0.0..=200.0).contains(&up));
        assert!((0.0..=200.0).contains(&down));
    }

    assert_eq!(filling.level(), 200.0);
    assert_eq!(draining.level(), 0.0);
}

#[test]
fn test_closed_valves_freeze_level() {
    let mut tank = tank(5.0, 3.0, 75.0);
    tank.set_inflow(false);
    tank.set_outflow(false);

    tank.step(60.0);
    assert_eq!(tank.level(), 75.0);

    tank.set_inflow(true);
    assert!(tank.step(60.0) > 75.0);
}

#[test]
fn test_zero_dt_is_a_no_op() {
    let mut tank = tank(5.0, 3.0, 42.0);
    assert_eq!(tank.step(0.0), 42.0);
}

#[test]
fn test_invalid_tank_configurations_rejected() {
    let base = TankConfig::default();

    let zero_height = TankConfig {
        max_height_cm: 0.0,
        ..base.clone()
    };
    assert!(matches!(
        PhysicalTank::new(&zero_height),
        Err(ConfigError::NonPositiveGeometry { .. })
    ));

    let overfull = TankConfig {
        initial_level_cm: 250.0,
        ..base.clone()
    };
    assert!(matches!(
        PhysicalTank::new(&overfull),
        Err(ConfigError::InitialLevelOutOfRange { .. })
    ));

    let negative_flow = TankConfig {
        outflow_rate_lpm: -1.0,
        ..base
    };
    assert!(matches!(
        PhysicalTank::new(&negative_flow),
        Err(ConfigError::Negative { .. })
    ));
}
