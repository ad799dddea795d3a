#![no_main]
use libfuzzer_sys::fuzz_target;
use soilcal_core::CalibrationSnapshot;

fuzz_target!(|data: &str| {
    let mut snap = CalibrationSnapshot::new("fuzz", 1);
    let before = snap.clone();
    match snap.apply_json(data) {
        // Whatever merged in must serialize again.
        Ok(()) => {
            let _ = snap.is_complete();
            if let Ok(text) = snap.to_json() {
                assert!(CalibrationSnapshot::from_json(&text).is_ok());
            }
        }
        Err(_) => assert_eq!(snap, before),
    }
});
