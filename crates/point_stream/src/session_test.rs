use super::*;
use crate::decoder::encode_frame;
use crate::types::{ChunkMeta, ColorEncoding};

fn frame(source: &str, start: u64, count: usize) -> Vec<u8> {
  let positions: Vec<f32> = (0..count * 3).map(|i| (start as usize * 3 + i) as f32).collect();
  encode_frame(&ChunkMeta::new(source, start, count as u32), &positions, None)
}

fn session() -> StreamSession {
  StreamSession::new(SessionConfig {
    pool: PoolConfig {
      initial_capacity_points: 8,
    },
    ..Default::default()
  })
  .unwrap()
}

#[test]
fn test_bytes_flow_into_index() {
  let mut session = session();
  assert_eq!(session.submit_bytes(&frame("a", 0, 3)).unwrap(), 1);
  assert_eq!(session.pending_chunks(), 1);

  assert_eq!(session.tick(), 1);
  assert_eq!(session.pools().pending_points("a"), 3);

  let snapshots = session.flush_all();
  assert_eq!(snapshots.len(), 1);
  assert_eq!(session.index().total_points(), 3);

  let slices = session.query_lod(Vec3::ZERO);
  let total: usize = slices.iter().map(LodSlice::point_count).sum();
  assert_eq!(total, 3);
}

/// Five queued chunks pause the producer once; consuming them resumes it
/// once.
#[test]
fn test_backpressure_directives() {
  let mut session = session();
  let outbound = session.outbound();

  for i in 0..7 {
    session.submit_bytes(&frame("a", i, 1)).unwrap();
  }
  assert!(session.is_paused());
  assert_eq!(outbound.try_iter().collect::<Vec<_>>(), vec![FlowDirective::Pause]);

  // Batch of four: 7 -> 3, below the watermark.
  assert_eq!(session.tick(), 4);
  assert_eq!(outbound.try_iter().collect::<Vec<_>>(), vec![FlowDirective::Resume]);

  session.tick();
  assert!(outbound.try_iter().next().is_none());
  assert_eq!(session.metrics().flow.pause_directives, 1);
  assert_eq!(session.metrics().flow.resume_directives, 1);
}

#[test]
fn test_fragmented_submission_matches_whole() {
  let mut stream = frame("a", 0, 2);
  stream.extend(frame("b", 0, 3));

  let mut whole = session();
  whole.submit_bytes(&stream).unwrap();

  let mut split = session();
  let mut decoded = 0;
  for piece in stream.chunks(5) {
    decoded += split.submit_bytes(piece).unwrap();
  }
  assert_eq!(decoded, 2);

  while whole.tick() > 0 {}
  while split.tick() > 0 {}
  let a: Vec<Vec<f32>> = whole.flush_all().iter().map(|s| s.positions().to_vec()).collect();
  let b: Vec<Vec<f32>> = split.flush_all().iter().map(|s| s.positions().to_vec()).collect();
  assert_eq!(a, b);
}

#[test]
fn test_complete_flushes_everything() {
  let mut session = session();
  let events = session.subscribe();
  session.submit_bytes(&frame("a", 0, 2)).unwrap();
  session.submit_bytes(&frame("b", 0, 4)).unwrap();

  let message = session.submit_text(r#"{"type":"complete"}"#).unwrap();
  assert_eq!(message, Some(ControlMessage::Complete));
  assert_eq!(session.pending_chunks(), 0);
  assert_eq!(session.index().total_points(), 6);

  let received: Vec<SessionEvent> = events.try_iter().collect();
  assert_eq!(received[0], SessionEvent::Control(ControlMessage::Complete));
  assert!(received.contains(&SessionEvent::Flushed {
    source_id: "b".into(),
    points: 4
  }));
}

#[test]
fn test_every_subscriber_sees_events() {
  let mut session = session();
  let first = session.subscribe();
  let second = session.subscribe();
  session.submit_text(r#"{"type":"connected"}"#).unwrap();

  assert_eq!(first.try_recv(), Ok(SessionEvent::Control(ControlMessage::Connected)));
  assert_eq!(second.try_recv(), Ok(SessionEvent::Control(ControlMessage::Connected)));
}

#[test]
fn test_dropped_subscriber_is_pruned() {
  let mut session = session();
  drop(session.subscribe());
  let kept = session.subscribe();
  session.submit_text(r#"{"type":"progress","progress":0.5}"#).unwrap();
  assert_eq!(session.subscribers.len(), 1);
  assert!(kept.try_recv().is_ok());
}

#[test]
fn test_unknown_text_is_counted_not_fatal() {
  let mut session = session();
  assert_eq!(session.submit_text("hello").unwrap(), None);
  assert_eq!(session.submit_text(r#"{"type":"mystery"}"#).unwrap(), None);
  assert_eq!(session.metrics().ignored_control_messages, 2);
  assert_eq!(session.state(), SessionState::Active);
}

#[test]
fn test_known_sources_are_deduplicated() {
  let mut session = session();
  session
    .submit_text(r#"{"type":"files","files":["b.laz","a.laz","b.laz"]}"#)
    .unwrap();
  session.submit_bytes(&frame("a.laz", 0, 1)).unwrap();
  session.submit_bytes(&frame("c.laz", 0, 1)).unwrap();

  assert_eq!(
    session.known_sources(),
    &["b.laz".to_string(), "a.laz".to_string(), "c.laz".to_string()]
  );
}

#[test]
fn test_close_flushes_and_rejects_later_input() {
  let mut session = session();
  let events = session.subscribe();
  session.submit_bytes(&frame("a", 0, 2)).unwrap();
  session.tick();
  session.submit_bytes(&frame("b", 0, 3)).unwrap();
  // Half a frame stays buffered in the decoder.
  let partial = frame("c", 0, 4);
  session.submit_bytes(&partial[..10]).unwrap();

  let snapshots = session.close(CloseReason::TransportClosed);
  assert_eq!(snapshots.len(), 2);
  assert_eq!(session.index().total_points(), 5);
  assert_eq!(session.state(), SessionState::Closed);
  assert_eq!(session.metrics().decoder.discarded_bytes, 10);
  assert!(session.pools().sources().is_empty());
  assert_eq!(session.pools().capacity_points("a"), None);
  drop(snapshots);
  assert_eq!(session.metrics().pools.snapshots_flushed, 2);

  assert_eq!(session.submit_bytes(&partial), Err(StreamError::TransportClosed));
  assert_eq!(session.submit_text("{}"), Err(StreamError::TransportClosed));
  assert_eq!(session.tick(), 0);
  assert!(session.close(CloseReason::Client).is_empty());

  let last = events.try_iter().last();
  assert_eq!(last, Some(SessionEvent::Closed(CloseReason::TransportClosed)));
}

#[test]
fn test_budget_rejection_reported() {
  let mut session = StreamSession::new(SessionConfig {
    octree: OctreeConfig {
      max_points_gpu: 4,
      ..Default::default()
    },
    ..Default::default()
  })
  .unwrap();
  let events = session.subscribe();

  session.submit_bytes(&frame("a", 0, 3)).unwrap();
  session.submit_bytes(&frame("b", 0, 3)).unwrap();
  session.submit_text(r#"{"type":"complete"}"#).unwrap();

  assert_eq!(session.index().total_points(), 3);
  assert_eq!(session.metrics().index.chunks_rejected, 1);
  assert!(events.try_iter().any(|e| e
    == SessionEvent::Rejected(StreamError::CapacityExceeded {
      requested: 3,
      available: 1
    })));
}

#[test]
fn test_clear_source_and_all() {
  let mut session = session();
  session.submit_bytes(&frame("a", 0, 2)).unwrap();
  session.submit_bytes(&frame("b", 0, 2)).unwrap();
  session.tick();
  session.submit_bytes(&frame("a", 2, 2)).unwrap();

  session.clear(ClearTarget::Source("a".into()));
  assert_eq!(session.pending_chunks(), 0);
  assert_eq!(session.pools().capacity_points("a"), None);
  assert_eq!(session.pools().pending_points("b"), 2);

  session.flush_all();
  assert_eq!(session.index().total_points(), 2);
  session.clear(ClearTarget::All);
  assert!(session.index().is_empty());
  assert!(session.pools().sources().is_empty());
}

#[test]
fn test_clear_resumes_paused_producer() {
  let mut session = session();
  let outbound = session.outbound();
  for i in 0..5 {
    session.submit_bytes(&frame("a", i, 1)).unwrap();
  }
  session.clear(ClearTarget::All);
  assert_eq!(
    outbound.try_iter().collect::<Vec<_>>(),
    vec![FlowDirective::Pause, FlowDirective::Resume]
  );
}

#[test]
fn test_tiles_share_the_chunk_path() {
  let dataset = DatasetMetadata::from_json(
    r#"{
      "bounds": { "min": [0.0, 0.0, 0.0], "max": [10.0, 10.0, 10.0] },
      "tiles": {
        "0_0": { "origin": [0.0, 0.0, 0.0] },
        "0_1": {}
      }
    }"#,
  )
  .unwrap();
  let record: Vec<u8> = [5.0f32, 5.0, 5.0, 0.0, 0.0, 0.0]
    .iter()
    .flat_map(|v| v.to_le_bytes())
    .collect();

  let mut session = session();
  session.submit_tile(&dataset, "0_0", &record).unwrap();
  assert_eq!(
    session.submit_tile(&dataset, "0_1", &record),
    Err(StreamError::MissingOrigin("0_1".into()))
  );
  assert_eq!(session.metrics().missing_origin, 1);

  session.tick();
  let snapshots = session.flush_all();
  assert_eq!(snapshots[0].positions(), &[0.0, 0.0, 0.0]);
}

#[test]
fn test_colored_stream_reaches_index() {
  let mut session = session();
  let meta = ChunkMeta::new("a", 0, 2).with_color(ColorEncoding::U16);
  let bytes = encode_frame(&meta, &[0.0; 6], Some(&[1.0; 6]));
  session.submit_bytes(&bytes).unwrap();
  session.submit_text(r#"{"type":"complete"}"#).unwrap();

  let slices = session.query_lod(Vec3::ZERO);
  assert_eq!(slices[0].colors, &[1.0; 6]);
}

#[test]
fn test_config_from_toml() {
  let config = SessionConfig::from_toml_str(
    r#"
    [pool]
    initial_capacity_points = 1024

    [flow]
    high_watermark = 8

    [octree]
    max_leaf_points = 500
    "#,
  )
  .unwrap();

  assert_eq!(config.pool.initial_capacity_points, 1024);
  assert_eq!(config.flow.high_watermark, 8);
  assert_eq!(config.octree.max_leaf_points, 500);
  assert_eq!(config.ingest.batch_size, 4);

  assert!(matches!(
    SessionConfig::from_toml_str("[flow]\nhigh_watermark = 0"),
    Err(StreamError::Config(_))
  ));
  assert!(SessionConfig::from_toml_str("[flow").is_err());
  assert!(matches!(
    SessionConfig::from_toml_str("[decoder]\nmax_points_per_chunk = 0"),
    Err(StreamError::Config(_))
  ));
}
