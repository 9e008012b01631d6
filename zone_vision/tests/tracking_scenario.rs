use approx::assert_abs_diff_eq;
use image::{GrayImage, Luma, Rgb, RgbImage};
use zone_vision::analysis::DwellAnalyzer;
use zone_vision::frame_source::{frame_index_at, FrameSource, ImageSequenceSource};
use zone_vision::persistence::{read_records, CsvRecordSink, OutputLayout, RecordSink};
use zone_vision::{
    PipelineConfig, Point, PositionRecord, Rect, Sensitivity, TrackingPipeline, ZoneId, ZoneIndex,
};

const SIZE: u32 = 260;

/// Binary mask with one filled block whose bounding-box centre is `centre`.
fn mask_centred_at(centre: (u32, u32), side: u32) -> GrayImage {
    let mut mask = GrayImage::new(SIZE, SIZE);
    let x0 = centre.0 - side / 2;
    let y0 = centre.1 - side / 2;
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}

fn nested_zones() -> ZoneIndex {
    ZoneIndex::new(vec![Rect::new(0, 0, 100, 100), Rect::new(20, 20, 30, 30)])
}

fn scenario_config() -> PipelineConfig {
    PipelineConfig {
        sensitivity: Sensitivity::new(50).unwrap(),
        ..PipelineConfig::default()
    }
}

fn run_scenario() -> (Vec<PositionRecord>, TrackingPipeline) {
    let mut pipeline = TrackingPipeline::new(scenario_config(), nested_zones(), (SIZE, SIZE), 10.0).unwrap();
    let masks = [
        mask_centred_at((30, 30), 30),
        GrayImage::new(SIZE, SIZE),
        mask_centred_at((200, 200), 30),
        mask_centred_at((5, 5), 9),
    ];
    let records: Vec<PositionRecord> = masks
        .iter()
        .enumerate()
        .map(|(index, mask)| pipeline.process_mask(index as u64, mask).unwrap())
        .collect();
    (records, pipeline)
}

#[test]
fn nested_zone_scenario_follows_fallback_policy() {
    let (records, pipeline) = run_scenario();
    let z1 = Some(ZoneId(1));
    let z2 = Some(ZoneId(2));

    assert_eq!(records[0].position, Some(Point::new(30, 30)));
    assert_eq!(records[0].zone, z2);

    assert_eq!(records[1].position, Some(Point::new(30, 30)));
    assert_eq!(records[1].zone, z2);

    assert_eq!(records[2].position, Some(Point::new(200, 200)));
    assert_eq!(records[2].zone, z2);

    assert_eq!(records[3].position, Some(Point::new(5, 5)));
    assert_eq!(records[3].zone, z1);

    assert_eq!(pipeline.heatmap().total(), 3);
    assert_eq!(pipeline.heatmap().get(200, 200), 1);
    assert_eq!(pipeline.state().last_known_zone, z1);
}

#[test]
fn scenario_records_survive_csv_and_analyze() {
    let (records, _) = run_scenario();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario_positions.csv");

    let mut sink = CsvRecordSink::create(&path).unwrap();
    for record in &records {
        sink.append(record).unwrap();
    }
    sink.finish().unwrap();
    drop(sink);

    let restored = read_records(&path).unwrap();
    assert_eq!(restored, records);

    let summary = DwellAnalyzer::analyze(&restored);
    assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(2)], 0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(1)], 0.1, epsilon = 1e-9);
    assert_abs_diff_eq!(summary.zoned_seconds(), summary.elapsed_seconds(), epsilon = 1e-9);
    assert_eq!(summary.transitions.len(), 2);
    assert_eq!(summary.zone_changes[0].entering, Some(ZoneId(1)));
    assert_eq!(summary.zone_changes[0].exiting, Some(ZoneId(2)));
}

#[test]
fn first_frame_without_detection_emits_nothing_known() {
    let mut pipeline = TrackingPipeline::new(PipelineConfig::default(), nested_zones(), (SIZE, SIZE), 30.0).unwrap();
    let record = pipeline.process_mask(0, &GrayImage::new(SIZE, SIZE)).unwrap();
    assert_eq!(record, PositionRecord { time: 0.0, position: None, zone: None });
}

#[test]
fn empty_zone_list_never_assigns_a_zone() {
    let mut pipeline = TrackingPipeline::new(scenario_config(), ZoneIndex::default(), (SIZE, SIZE), 10.0).unwrap();
    let first = pipeline.process_mask(0, &mask_centred_at((30, 30), 30)).unwrap();
    let second = pipeline.process_mask(1, &GrayImage::new(SIZE, SIZE)).unwrap();
    assert_eq!(first.zone, None);
    assert_eq!(first.position, Some(Point::new(30, 30)));
    assert_eq!(second, PositionRecord { time: 0.1, position: None, zone: None });
}

#[test]
fn image_sequence_run_writes_records_and_heatmap() {
    let frames_dir = tempfile::tempdir().unwrap();
    let background = RgbImage::from_pixel(120, 80, Rgb([60, 60, 60]));
    for index in 0..30u32 {
        let mut frame = background.clone();
        // The subject crosses the arena in four non-overlapping hops, then leaves view.
        if (20..24).contains(&index) {
            let x0 = 5 + (index - 20) * 30;
            for y in 20..45 {
                for x in x0..x0 + 25 {
                    frame.put_pixel(x, y, Rgb([230, 230, 230]));
                }
            }
        }
        frame.save(frames_dir.path().join(format!("frame_{index:03}.png"))).unwrap();
    }

    let mut source = ImageSequenceSource::open(frames_dir.path(), 10.0).unwrap();
    source.seek(frame_index_at(0.5, source.frame_rate())).unwrap();
    let zones = ZoneIndex::new(vec![Rect::new(0, 0, 60, 80), Rect::new(60, 0, 60, 80)]);
    let mut pipeline = TrackingPipeline::new(PipelineConfig::default(), zones, source.resolution(), 10.0).unwrap();

    let output_root = tempfile::tempdir().unwrap();
    let layout = OutputLayout::for_input(output_root.path(), frames_dir.path().join("arena.mp4"));
    layout.create().unwrap();
    let mut sink = CsvRecordSink::create(layout.positions_path()).unwrap();
    let summary = pipeline.run(&mut source, &mut sink).unwrap();
    drop(sink);
    pipeline.heatmap().save(layout.heatmap_path()).unwrap();

    assert_eq!(summary.frames_processed, 25);
    assert_eq!(summary.detections, 4);
    assert_abs_diff_eq!(summary.first_time.unwrap(), 0.5);

    let records = read_records(layout.positions_path()).unwrap();
    assert_eq!(records.len(), 25);
    assert!(records[..15].iter().all(|r| r.position.is_none() && r.zone.is_none()));
    assert_eq!(records[15].position, Some(Point::new(17, 32)));
    assert_eq!(records[15].zone, Some(ZoneId(1)));
    assert_eq!(records[18].position, Some(Point::new(107, 32)));
    assert_eq!(records[18].zone, Some(ZoneId(2)));
    assert!(records[19..].iter().all(|r| r.position == Some(Point::new(107, 32)) && r.zone == Some(ZoneId(2))));

    let heatmap = image::open(layout.heatmap_path()).unwrap().into_luma16();
    assert_eq!(heatmap.dimensions(), (120, 80));
    assert_eq!(heatmap.get_pixel(17, 32).0[0], 1);
    assert_eq!(heatmap.pixels().map(|p| p.0[0] as u32).sum::<u32>(), 4);
}
