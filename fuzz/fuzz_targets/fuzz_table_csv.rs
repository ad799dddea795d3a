#![no_main]
use libfuzzer_sys::fuzz_target;
use soilcal_core::{CalibrationTable, SensorReading};

fuzz_target!(|data: &str| {
    let parsed = soilcal_config::parse_calibration_table(data);
    if let Ok(table) = CalibrationTable::from_parsed(&parsed) {
        let reading = SensorReading {
            temperature: 21.0,
            humidity: 55.0,
            ec: 1200.0,
            ph: 6.5,
            nitrogen: 40.0,
            phosphorus: 20.0,
            potassium: 60.0,
        };
        let _ = table.apply(&reading);
        let _ = table.to_csv();
    }
});
