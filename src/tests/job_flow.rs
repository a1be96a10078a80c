use super::fixtures::*;
use crate::config::{TransformationOptions, GRANULARITY_NONE};
use crate::error::{TrackTranscoderError, TransformError};
use crate::io::{shared_source, shared_target, MuxerMediaTarget, SharedMediaSource, SharedMediaTarget};
use crate::job::TransformationJob;
use crate::track_transform::TrackTransform;
use crate::types::{BufferFlags, MediaFormat, MediaRange};

const STEP_US: i64 = 100_000;

fn options(granularity: u32) -> TransformationOptions {
    TransformationOptions {
        granularity,
        ..Default::default()
    }
}

fn video_format(samples: usize) -> MediaFormat {
    MediaFormat::video("video/avc", 640, 360).with_duration_us(samples as i64 * STEP_US)
}

fn audio_format(samples: usize) -> MediaFormat {
    MediaFormat::audio("audio/mp4a-latm", 44_100, 2).with_duration_us(samples as i64 * STEP_US)
}

fn passthrough(source: &SharedMediaSource, track: usize, target: &SharedMediaTarget) -> TrackTransform {
    TrackTransform::builder(source.clone(), track, target.clone()).build()
}

#[test]
fn test_passthrough_two_tracks_completes() {
    let log = CallLog::new();
    let samples = interleaved_samples(2, 30, STEP_US);
    let source = shared_source(FakeSource::new(vec![video_format(30), audio_format(30)], samples, log.clone()));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let listener = RecordingListener::new();
    let transforms = vec![passthrough(&source, 0, &target), passthrough(&source, 1, &target)];
    let mut job = TransformationJob::new("job", transforms, options(GRANULARITY_NONE), listener.clone());
    job.run();

    let events = listener.events();
    assert_eq!(events.first(), Some(&Recorded::Started));
    let Some(Recorded::Completed(stats)) = events.last() else {
        panic!("expected completion, got {:?}", events.last());
    };
    assert_eq!(listener.terminal_events().len(), 1);
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].decoder.as_deref(), Some("passthrough"));
    assert_eq!(stats[1].target_format.as_ref().map(|f| f.mime.as_str()), Some("audio/mp4a-latm"));

    let record = record.lock();
    assert_eq!(record.added.len(), 2);
    assert_eq!(record.written.iter().filter(|s| s.track == 0).count(), 30);
    assert_eq!(record.written.iter().filter(|s| s.track == 1).count(), 30);
    assert!(record.written[0].flags.contains(BufferFlags::KEY_FRAME));

    assert_eq!(log.count("source.release"), 1);
    assert_eq!(log.count("target.release"), 1);
    assert!(log.position("source.select_track.1") < log.position("source.seek_to.0"));
}

#[test]
fn test_progress_respects_granularity() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(100)],
        interleaved_samples(1, 100, STEP_US),
        log.clone(),
    ));
    let (target, _) = FakeTarget::new(log);
    let target = shared_target(target);

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![passthrough(&source, 0, &target)], options(5), listener.clone());
    job.run();

    let progress = listener.progress();
    assert!(progress.len() >= 4 && progress.len() <= 5, "reported {:?}", progress);
    assert!(progress[0] >= 0.2 - 1e-6);
    for pair in progress.windows(2) {
        assert!(pair[1] - pair[0] >= 0.2 - 1e-6, "reported {:?}", progress);
    }
}

#[test]
fn test_progress_without_granularity_reports_every_change() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(20)],
        interleaved_samples(1, 20, STEP_US),
        log.clone(),
    ));
    let (target, _) = FakeTarget::new(log);
    let target = shared_target(target);

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new(
        "job",
        vec![passthrough(&source, 0, &target)],
        options(GRANULARITY_NONE),
        listener.clone(),
    );
    job.run();

    let progress = listener.progress();
    assert!(progress.len() >= 19, "reported {:?}", progress);
    for pair in progress.windows(2) {
        assert!(pair[1] > pair[0]);
    }
    assert_eq!(progress.last(), Some(&1.0));
}

#[test]
fn test_empty_transform_list() {
    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", Vec::new(), options(5), listener.clone());
    let err = job.create_track_transcoders().unwrap_err();
    assert!(matches!(
        err,
        TransformError::Transcoder(TrackTranscoderError::NoTracksFound)
    ));
    assert!(listener.events().is_empty());

    let mut job = TransformationJob::new("job", Vec::new(), options(5), listener.clone());
    job.run();
    let events = listener.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Recorded::Error(msg, stats) if msg.contains("No tracks found") && stats.is_empty()));
}

#[test]
fn test_insufficient_disk_space_fails_before_codec_setup() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    std::fs::write(&output, b"").unwrap();

    let log = CallLog::new();
    let source_format = video_format(100).with_bitrate(8_000_000);
    let source = shared_source(FakeSource::new(
        vec![source_format],
        interleaved_samples(1, 100, STEP_US),
        log.clone(),
    ));
    let (target, _) = FakeTarget::new(log.clone());
    let target = shared_target(target.with_output_path(output.clone()));

    let target_format = MediaFormat::video("video/avc", 320, 180).with_bitrate(1_000_000);
    let transform = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()))
        .renderer(FakeSurfaceRenderer::new(log.clone()))
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(5), listener.clone())
        .with_disk_probe(FixedDiskProbe(Some(10)));
    job.run();

    let events = listener.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], Recorded::Error(msg, _) if msg.contains("Insufficient disk space")));
    assert!(job.transcoders().is_empty());
    assert!(!log.contains("enc0.init"));
    assert!(!log.contains("dec0.init"));
    assert_eq!(log.count("source.release"), 1);
    assert_eq!(log.count("target.release"), 1);
    assert!(!output.exists());
}

#[test]
fn test_disk_probe_failure_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(10).with_bitrate(8_000_000)],
        interleaved_samples(1, 10, STEP_US),
        log.clone(),
    ));
    let (target, _) = FakeTarget::new(log);
    let target = shared_target(target.with_output_path(dir.path().join("out.mp4")));

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![passthrough(&source, 0, &target)], options(5), listener.clone())
        .with_disk_probe(FixedDiskProbe(None));
    job.run();

    assert!(matches!(listener.terminal_events()[..], [Recorded::Completed(_)]));
}

#[test]
fn test_start_failure_releases_every_track() {
    let log = CallLog::new();
    let samples = pcm_samples(0, 4, 64, 44_100);
    let formats = vec![
        MediaFormat::audio("audio/raw", 44_100, 1),
        MediaFormat::audio("audio/raw", 44_100, 1),
    ];
    let source = shared_source(FakeSource::new(formats, samples, log.clone()));
    let (target, _) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let target_format = MediaFormat::audio("audio/mp4a-latm", 44_100, 1);
    let first = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()))
        .target_format(target_format.clone())
        .build();
    let second = TrackTransform::builder(source.clone(), 1, target.clone())
        .decoder(FakeDecoder::new("dec1", log.clone()))
        .encoder(FakeEncoder::new("enc1", target_format.clone(), log.clone()).failing_start())
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![first, second], options(5), listener.clone());
    job.run();

    let events = listener.events();
    assert_eq!(events.len(), 1, "events {:?}", events);
    assert!(matches!(&events[0], Recorded::Error(msg, _) if msg.contains("enc1")));

    assert_eq!(log.count("enc0.start"), 1);
    assert_eq!(log.count("enc0.stop"), 1);
    assert_eq!(log.count("enc0.release"), 1);
    assert_eq!(log.count("dec0.release"), 1);
    assert_eq!(log.count("enc1.release"), 1);
    assert!(!log.contains("dec1.start"));
    assert_eq!(log.count("source.release"), 1);
    assert_eq!(log.count("target.release"), 1);
}

#[test]
fn test_cancel_on_first_progress() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.mp4");
    std::fs::write(&output, b"partial").unwrap();

    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(50)],
        interleaved_samples(1, 50, STEP_US),
        log.clone(),
    ));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target.with_output_path(output.clone()));

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new(
        "job",
        vec![passthrough(&source, 0, &target)],
        options(GRANULARITY_NONE),
        listener.clone(),
    )
    .with_disk_probe(FixedDiskProbe(Some(u64::MAX)));
    listener.cancel_on_progress(job.cancellation_flag());
    job.run();

    assert_eq!(listener.progress().len(), 1);
    assert!(matches!(listener.terminal_events()[..], [Recorded::Cancelled(_)]));
    assert!(record.lock().written.len() < 50);
    assert!(!output.exists());
    assert_eq!(log.count("source.release"), 1);
    assert_eq!(log.count("target.release"), 1);
}

#[test]
fn test_cancel_before_start_skips_frame_loop() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(10)],
        interleaved_samples(1, 10, STEP_US),
        log.clone(),
    ));
    let (target, record) = FakeTarget::new(log);
    let target = shared_target(target);

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![passthrough(&source, 0, &target)], options(5), listener.clone());
    job.cancellation_flag().cancel();
    job.run();

    assert_eq!(listener.events()[0], Recorded::Started);
    assert!(matches!(listener.terminal_events()[..], [Recorded::Cancelled(_)]));
    assert!(record.lock().written.is_empty());
}

#[test]
fn test_audio_track_is_resampled() {
    let log = CallLog::new();
    let source_format = MediaFormat::audio("audio/raw", 48_000, 1).with_duration_us(100_000);
    let source = shared_source(FakeSource::new(
        vec![source_format],
        pcm_samples(0, 10, 480, 48_000),
        log.clone(),
    ));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let target_format = MediaFormat::audio("audio/mp4a-latm", 24_000, 1);
    let transform = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()))
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(GRANULARITY_NONE), listener.clone());
    job.run();

    let terminal = listener.terminal_events();
    let [Recorded::Completed(stats)] = &terminal[..] else {
        panic!("expected completion, got {:?}", terminal);
    };
    assert_eq!(stats[0].decoder.as_deref(), Some("dec0"));
    assert_eq!(stats[0].encoder.as_deref(), Some("enc0"));
    assert_eq!(stats[0].target_format.as_ref().and_then(|f| f.sample_rate()), Some(24_000));

    let record = record.lock();
    let written: usize = record.written.iter().map(|s| s.data.len()).sum();
    assert_eq!(written, 10 * 480);
    assert_eq!(record.added[0].1.duration_us, Some(100_000));
    // the first output sample keeps the source timestamp
    assert_eq!(record.written[0].presentation_time_us, 0);
    let second = record.written[1].presentation_time_us;
    assert!((9_999..=10_000).contains(&second), "pts {}", second);
}

#[test]
fn test_audio_waits_for_encoder_input_slots() {
    let log = CallLog::new();
    let source_format = MediaFormat::audio("audio/raw", 48_000, 1).with_duration_us(100_000);
    let source = shared_source(FakeSource::new(
        vec![source_format],
        pcm_samples(0, 10, 480, 48_000),
        log.clone(),
    ));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    // each decoded buffer needs all four slots, which only come back as output is drained
    let target_format = MediaFormat::audio("audio/mp4a-latm", 48_000, 1);
    let transform = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()).with_input_slots(4, 256))
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(5), listener.clone());
    job.run();

    let terminal = listener.terminal_events();
    assert!(matches!(terminal[..], [Recorded::Completed(_)]), "terminal {:?}", terminal);

    let record = record.lock();
    let written: usize = record.written.iter().map(|s| s.data.len()).sum();
    assert_eq!(written, 10 * 960);
    assert!(record.written.iter().all(|s| s.data.len() <= 256));
    let times: Vec<i64> = record.written.iter().map(|s| s.presentation_time_us).collect();
    assert!(times.windows(2).all(|pair| pair[0] < pair[1]), "times {:?}", times);
}

#[test]
fn test_video_frame_rate_is_lowered() {
    let log = CallLog::new();
    let source_format = MediaFormat::video("video/avc", 1280, 720)
        .with_frame_rate(60)
        .with_duration_us(1_000_000);
    let samples = (0..60)
        .map(|i| Sample {
            track: 0,
            time_us: i * 16_666,
            flags: BufferFlags::NONE,
            data: vec![1, 2, 3],
        })
        .collect();
    let source = shared_source(FakeSource::new(vec![source_format], samples, log.clone()));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let target_format = MediaFormat::video("video/avc", 640, 360).with_frame_rate(30);
    let transform = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()))
        .renderer(FakeSurfaceRenderer::new(log.clone()))
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(5), listener.clone());
    job.run();

    assert!(matches!(listener.terminal_events()[..], [Recorded::Completed(_)]));
    let written = record.lock().written.len();
    assert!((29..=31).contains(&written), "wrote {} frames", written);
    assert_eq!(log.count("dec0.render"), 60);
    assert_eq!(log.count("enc0.signal_eos"), 1);
    // encoder surface goes to the renderer, renderer surface to the decoder
    assert!(log.contains("renderer.init.Some(7)"));
    assert!(log.position("enc0.init") < log.position("renderer.init.Some(7)"));
    assert!(log.position("renderer.init.Some(7)") < log.position("dec0.init"));
}

#[test]
fn test_trim_range_ends_with_eos_sample() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(20)],
        interleaved_samples(1, 20, STEP_US),
        log.clone(),
    ));
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let listener = RecordingListener::new();
    let options = TransformationOptions {
        source_media_range: MediaRange::new(1_200_000, 1_600_000),
        ..options(5)
    };
    let mut job = TransformationJob::new("job", vec![passthrough(&source, 0, &target)], options, listener.clone());
    job.run();

    assert!(matches!(listener.terminal_events()[..], [Recorded::Completed(_)]));
    assert!(log.contains("source.seek_to.1200000"));

    let record = record.lock();
    assert_eq!(record.added[0].1.duration_us, Some(400_000));
    let times: Vec<i64> = record.written.iter().map(|s| s.presentation_time_us).collect();
    assert_eq!(times, vec![0, 100_000, 200_000, 300_000, 400_000]);
    let last = record.written.last().unwrap();
    assert!(last.flags.is_end_of_stream());
    assert!(last.data.is_empty());
}

#[test]
fn test_source_selection_narrows_options_range() {
    let log = CallLog::new();
    let source = FakeSource::new(vec![video_format(20)], interleaved_samples(1, 20, STEP_US), log.clone())
        .with_selection(MediaRange::new(1_000_000, MediaRange::UNBOUNDED_END));
    let source = shared_source(source);
    let (target, record) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let options = TransformationOptions {
        source_media_range: MediaRange::new(0, 1_500_000),
        ..options(5)
    };
    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![passthrough(&source, 0, &target)], options, listener.clone());
    job.run();

    assert!(log.contains("source.seek_to.1000000"));
    let record = record.lock();
    assert_eq!(record.written.iter().filter(|s| !s.flags.is_end_of_stream()).count(), 5);
}

#[test]
fn test_panic_in_codec_becomes_error() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![MediaFormat::audio("audio/raw", 44_100, 1)],
        pcm_samples(0, 4, 64, 44_100),
        log.clone(),
    ));
    let (target, _) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let target_format = MediaFormat::audio("audio/mp4a-latm", 44_100, 1);
    let transform = TrackTransform::builder(source.clone(), 0, target.clone())
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log.clone()).panicking())
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(5), listener.clone());
    job.run();

    let terminal = listener.terminal_events();
    assert!(matches!(&terminal[..], [Recorded::Error(msg, _)] if msg.contains("enc0 crashed")));
    assert_eq!(log.count("enc0.release"), 1);
    assert_eq!(log.count("source.release"), 1);
}

#[test]
fn test_video_without_renderer_is_rejected() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(vec![video_format(10)], Vec::new(), log.clone()));
    let (target, _) = FakeTarget::new(log.clone());
    let target = shared_target(target);

    let target_format = MediaFormat::video("video/hevc", 640, 360);
    let transform = TrackTransform::builder(source, 0, target)
        .decoder(FakeDecoder::new("dec0", log.clone()))
        .encoder(FakeEncoder::new("enc0", target_format.clone(), log))
        .target_format(target_format)
        .build();

    let listener = RecordingListener::new();
    let mut job = TransformationJob::new("job", vec![transform], options(5), listener.clone());
    job.run();

    assert!(matches!(&listener.terminal_events()[..], [Recorded::Error(msg, _)] if msg.contains("Renderer is not provided")));
}

#[test]
fn test_muxer_starts_after_every_track_is_added() {
    let log = CallLog::new();
    let source = shared_source(FakeSource::new(
        vec![video_format(10), audio_format(10)],
        interleaved_samples(2, 10, STEP_US),
        log.clone(),
    ));
    let target = shared_target(MuxerMediaTarget::new(LoggingMuxer::new(log.clone()), 2, 0, None).unwrap());

    let listener = RecordingListener::new();
    let transforms = vec![passthrough(&source, 0, &target), passthrough(&source, 1, &target)];
    let mut job = TransformationJob::new("job", transforms, options(5), listener.clone());
    job.run();

    assert!(matches!(listener.terminal_events()[..], [Recorded::Completed(_)]));
    let start = log.position("muxer.start").unwrap();
    assert!(log.position("muxer.add_track.video/avc").unwrap() < start);
    assert!(log.position("muxer.add_track.audio/mp4a-latm").unwrap() < start);
    assert!(log.position("muxer.write.0").unwrap() > start);
    assert_eq!(log.count("muxer.write.0"), 10);
    assert_eq!(log.count("muxer.write.1"), 10);
    assert_eq!(log.count("muxer.release"), 1);
}
