use adtape::{Ad, AdError, OpCode, Tape, VecAd};

#[test]
fn load_follows_the_replayed_index() {
    let mut x = [Ad::constant(1.0_f64), Ad::constant(2.0)];
    let tape = Tape::start(&mut x).unwrap();
    let table = VecAd::new(&[10.0, 20.0, 30.0]);
    let y = table.load(x[0]).unwrap() * x[1];
    assert_eq!(y.value(), 40.0);
    let f = tape.stop(&[y]).unwrap();
    assert!(f.opcodes().contains(&OpCode::Load));

    assert_eq!(f.evaluate(&[2.7, 2.0]).unwrap(), vec![60.0]);
    assert_eq!(f.evaluate(&[0.0, 3.0]).unwrap(), vec![30.0]);
    // The index carries no derivative.
    assert_eq!(f.gradient(&[2.0, 1.0]).unwrap(), vec![0.0, 30.0]);
}

#[test]
fn stored_variables_carry_derivatives() {
    let mut x = [Ad::constant(0.0_f64), Ad::constant(3.0)];
    let tape = Tape::start(&mut x).unwrap();
    let mut v = VecAd::new(&[1.0, 1.0]);
    v.store(Ad::constant(0.0), x[1] * x[1]).unwrap();
    let y = v.load(x[0]).unwrap();
    assert_eq!(y.value(), 9.0);
    let f = tape.stop(&[y]).unwrap();

    // Index 0 holds x1², index 1 still holds the initial constant.
    assert_eq!(f.evaluate(&[0.0, 4.0]).unwrap(), vec![16.0]);
    assert_eq!(f.gradient(&[0.0, 4.0]).unwrap(), vec![0.0, 8.0]);
    assert_eq!(f.evaluate(&[1.0, 4.0]).unwrap(), vec![1.0]);
    assert_eq!(f.gradient(&[1.0, 4.0]).unwrap(), vec![0.0, 0.0]);
}

#[test]
fn store_at_variable_index() {
    let mut x = [Ad::constant(1.0_f64), Ad::constant(5.0)];
    let tape = Tape::start(&mut x).unwrap();
    let mut v = VecAd::new(&[0.0, 0.0, 0.0]);
    v.store(x[0], x[1]).unwrap();
    let y = v.load(Ad::constant(1.0)).unwrap() + v.load(Ad::constant(2.0)).unwrap();
    let f = tape.stop(&[y]).unwrap();

    assert_eq!(f.evaluate(&[1.0, 7.0]).unwrap(), vec![7.0]);
    assert_eq!(f.evaluate(&[2.0, 7.0]).unwrap(), vec![7.0]);
    assert_eq!(f.evaluate(&[0.0, 7.0]).unwrap(), vec![0.0]);
    assert_eq!(f.gradient(&[2.0, 7.0]).unwrap(), vec![0.0, 1.0]);
}

#[test]
fn later_stores_shadow_earlier_ones() {
    let mut x = [Ad::constant(2.0_f64)];
    let tape = Tape::start(&mut x).unwrap();
    let mut v = VecAd::new(&[0.0]);
    v.store(Ad::constant(0.0), x[0]).unwrap();
    v.store(Ad::constant(0.0), x[0] * 3.0).unwrap();
    let y = v.load(Ad::constant(0.0)).unwrap();
    let f = tape.stop(&[y]).unwrap();
    assert_eq!(f.gradient(&[1.0]).unwrap(), vec![3.0]);
}

#[test]
fn out_of_range_index() {
    let mut x = [Ad::constant(1.0_f64)];
    let tape = Tape::start(&mut x).unwrap();
    let v = VecAd::new(&[1.0, 2.0, 3.0]);
    assert!(matches!(
        v.load(Ad::constant(5.0)),
        Err(AdError::IndexOutOfRange { index: 5, len: 3 })
    ));
    let y = v.load(x[0]).unwrap();
    let f = tape.stop(&[y]).unwrap();

    assert!(matches!(
        f.evaluate(&[7.0]),
        Err(AdError::IndexOutOfRange { index: 7, len: 3 })
    ));
    assert!(matches!(
        f.evaluate(&[f64::NAN]),
        Err(AdError::IndexOutOfRange { index: i64::MIN, .. })
    ));
}

#[test]
fn without_a_recording_it_is_a_plain_vector() {
    let mut v = VecAd::new(&[1.0_f64, 2.0]);
    assert_eq!(v.len(), 2);
    assert!(!v.is_empty());
    v.store(Ad::constant(1.0), Ad::constant(8.0)).unwrap();
    let y = v.load(Ad::constant(1.9)).unwrap();
    assert!(y.is_constant());
    assert_eq!(y.value(), 8.0);
}
