use flimkit_algorithms::{analyze_dataset, Dataset, FilterConfig, Frequency, Roi};
use flimkit_io::{
    open_source, CsvWriter, Error, LayerRegistry, RawFileSource, RawLayout, SampleType,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::{Builder, NamedTempFile, TempDir};

/// 16-bin decay, 3x4 pixels, brighter towards the right.
fn decay_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    for k in 0..16u32 {
        for _row in 0..3u32 {
            for col in 0..4u32 {
                let value = ((col + 1) * 400) >> (k / 3);
                bytes.extend_from_slice(&u16::try_from(value).unwrap().to_le_bytes());
            }
        }
    }
    bytes
}

fn raw_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = Builder::new().suffix(".raw").tempfile().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_length_must_match_layout() {
    let file = raw_file(&decay_bytes());
    let layout = RawLayout::new(16, 3, 4);
    assert!(RawFileSource::open(file.path(), layout).is_ok());

    for wrong in [
        RawLayout::new(16, 3, 5),
        RawLayout::new(16, 3, 4).with_channels(2),
        RawLayout::new(16, 3, 4).with_sample_type(SampleType::U32),
    ] {
        assert!(matches!(
            RawFileSource::open(file.path(), wrong),
            Err(Error::InvalidFormat(_))
        ));
    }

    let truncated = raw_file(&decay_bytes()[1..]);
    assert!(matches!(
        RawFileSource::open(truncated.path(), layout),
        Err(Error::InvalidFormat(_))
    ));
    assert!(matches!(
        RawFileSource::open(file.path(), RawLayout::new(0, 3, 4)),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn test_raw_file_to_csv() {
    let file = raw_file(&decay_bytes());
    let source = open_source(file.path(), Some(RawLayout::new(16, 3, 4).with_frequency(80.0)))
        .unwrap();
    let signal = source.load(0).unwrap();
    assert_eq!(signal.image_shape(), (3, 4));

    let mut dataset = Dataset::load("plate-a", Arc::new(signal), 1).unwrap();
    assert_eq!(dataset.frequency(), Frequency::Embedded(80.0));

    let rois = vec![Roi::new("all", 0.5, 0.25, 1.0)];
    // column 0 sums to 2337 photons, column 1 to 4675
    let filters = FilterConfig::new().with_min_photons(3000);
    let result = analyze_dataset(&mut dataset, None, &filters, &rois).unwrap();
    assert_eq!(result.summaries[0].pixel_count, 9);
    assert_eq!(result.labels.column(0).sum(), 0);

    let mut registry = LayerRegistry::new();
    registry.publish_dataset("plate-a", &dataset);
    registry.publish_labels("plate-a", &result);
    let layers = registry
        .select(&["plate-a/g", "plate-a/s", "plate-a/photon_mask", "plate-a/roi_labels"])
        .unwrap();

    let dir = TempDir::new().unwrap();
    let pixels = dir.path().join("pixels.csv");
    CsvWriter::create(&pixels)
        .unwrap()
        .write_pixel_table(&layers)
        .unwrap();
    let content = std::fs::read_to_string(&pixels).unwrap();
    assert_eq!(content.lines().count(), 1 + 12);
    assert!(content.starts_with("row,col,plate-a/g,plate-a/s,plate-a/photon_mask,plate-a/roi_labels"));

    let rois_csv = dir.path().join("rois.csv");
    CsvWriter::create(&rois_csv)
        .unwrap()
        .write_roi_summaries(dataset.name(), &result.summaries)
        .unwrap();
    let content = std::fs::read_to_string(&rois_csv).unwrap();
    assert!(content.lines().nth(1).unwrap().starts_with("plate-a,1,all,9,"));
}
