use std::time::Duration;

use camino::Utf8Path;
use chrono::{TimeDelta, TimeZone, Utc};

use geomag_store::batch::{Batch, Formatter};
use geomag_store::codec::{BenmoreCodec, Calibration, FluxgateCodec, GsmCodec, RawCodec};
use geomag_store::domain::Reading;

const OBS: &str = "NZ_APIM_51_LFF, 2018-06-23 04:59:56.000, 3877896.0, 99.0
NZ_APIM_51_LFF, 2018-06-23 04:59:57.000, 3877895.0, 99.0
NZ_APIM_51_LFF, 2018-06-23 04:59:58.000, 3877900.0, 99.0
NZ_APIM_51_LFF, 2018-06-23 04:59:59.000, 3877896.0, 99.0
";

const GSM_TEMPLATE: &str =
    "{{year}}/{{year}}.{{yearday}}/{{year}}.{{yearday}}.{{hour}}{{minute}}.{{second}}.{{tolower .Label}}.raw";

#[test]
fn gsm_decode_encode_is_byte_identical() {
    let gsm = Batch::new("gsm-test", GsmCodec);
    let decoded = gsm.decode(OBS.as_bytes()).unwrap();

    assert_eq!(decoded.len(), 4);
    assert_eq!(decoded.readings()[0].tag(), "NZ_APIM_51_LFF");
    assert_eq!(decoded.readings()[0].values(), &[3877896.0, 99.0]);
    assert_eq!(decoded.readings()[2].values(), &[3877900.0, 99.0]);

    let encoded = decoded.encode().unwrap();
    assert_eq!(String::from_utf8(encoded).unwrap(), OBS);
}

#[test]
fn gsm_split_gives_single_hour_and_filename() {
    let decoded = Batch::new("gsm-test", GsmCodec).decode(OBS.as_bytes()).unwrap();
    let batch = Batch::with_readings("gsm-test", GsmCodec, decoded.readings().to_vec());
    assert_eq!(
        batch.at(),
        Some(Utc.with_ymd_and_hms(2018, 6, 23, 4, 59, 56).unwrap())
    );

    let buckets = batch.split(Duration::from_secs(3600)).unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(
        buckets[0].at(),
        Some(Utc.with_ymd_and_hms(2018, 6, 23, 4, 0, 0).unwrap())
    );
    assert_eq!(buckets[0].len(), 4);

    let path =
        geomag_store::template::build_path(Utf8Path::new(""), GSM_TEMPLATE, &buckets[0]).unwrap();
    assert_eq!(path, "2018/2018.174/2018.174.0400.00.gsm-test.raw");
}

#[test]
fn raw_roundtrip_ignores_input_order() {
    let t0 = Utc.with_ymd_and_hms(2021, 2, 3, 10, 0, 0).unwrap();
    let readings = vec![
        Reading::new(t0 + TimeDelta::milliseconds(2500), "NZ.EYWM.50.LFY", vec![-2.25, 7.0]),
        Reading::new(t0, "NZ.EYWM.50.LFX", vec![1.5, 3.125]),
        Reading::new(t0 + TimeDelta::seconds(1), "NZ.EYWM.50.LFZ", vec![0.0, -0.5]),
    ];
    let batch = Batch::with_readings("raw", RawCodec::new(3), readings.clone());

    let decoded = batch.decode(&batch.encode().unwrap()).unwrap();

    let mut expected = readings;
    expected.sort_by_key(Reading::at);
    assert_eq!(decoded.readings(), expected.as_slice());
}

#[test]
fn raw_zero_precision_rounds_values() {
    let t0 = Utc.with_ymd_and_hms(2021, 2, 3, 10, 0, 0).unwrap();
    let batch = Batch::with_readings(
        "raw",
        RawCodec::new(0),
        vec![Reading::new(t0, "NZ.EYWM.50.LFX", vec![1234.0])],
    );
    let text = String::from_utf8(batch.encode().unwrap()).unwrap();
    assert_eq!(text, "2021-02-03 10:00:00.000000Z,NZ.EYWM.50.LFX,1234\n");
}

#[test]
fn benmore_roundtrip() {
    let t0 = Utc.with_ymd_and_hms(2019, 11, 30, 23, 59, 59).unwrap();
    let readings = vec![
        Reading::new(t0, "NZ_BENM_50_LFZ", vec![0.00390625]),
        Reading::new(t0 - TimeDelta::milliseconds(500), "NZ_BENM_50_LFZ", vec![-12.5]),
    ];
    let batch = Batch::with_readings("benmore", BenmoreCodec, readings);
    let decoded = batch.decode(&batch.encode().unwrap()).unwrap();

    assert_eq!(decoded.len(), 2);
    assert_eq!(decoded.readings()[0].values(), &[-12.5]);
    assert_eq!(decoded.readings()[1].values(), &[0.00390625]);
}

#[test]
fn fluxgate_roundtrip_at_file_precision() {
    let hour = Utc.with_ymd_and_hms(2018, 6, 23, 4, 0, 0).unwrap();
    let calibration = Calibration {
        code: "EYR".to_string(),
        coil: [50.0, 50.0, 50.0],
        res: [2.0, 2.0, 2.0],
        ..Calibration::default()
    };
    let readings = (0..5)
        .map(|i| {
            Reading::new(
                hour + TimeDelta::seconds(i * 60 + 7),
                "",
                vec![0.5 + i as f64, -0.25, 0.125, 21.5, 30.25, 0.0],
            )
        })
        .collect::<Vec<_>>();
    let batch = Batch::with_readings("eyr", FluxgateCodec::new(calibration), readings.clone());
    let bucket = batch.split(Duration::from_secs(3600)).unwrap().remove(0);

    let data = bucket.encode().unwrap();
    let text = String::from_utf8(data.clone()).unwrap();
    assert!(text.contains("epoch=1529726400\n"));
    assert!(text.contains("code=EYR\n"));

    let decoded = bucket.decode(&data).unwrap();
    assert_eq!(decoded.readings(), readings.as_slice());
}
