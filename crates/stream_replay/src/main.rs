//! Stream replay tool.
//!
//! Feeds a captured wire stream (or a preprocessed tile dataset) through an
//! ingestion session, honoring PAUSE / RESUME the way a live consumer would,
//! and reports what the session saw.
//!
//! Capture files are the raw concatenation of binary frames:
//! `[u32 BE len][JSON meta][positions][colors]...`

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use point_stream::octree::{AsyncIndexBuilder, BuildRequest};
use point_stream::{
	CloseReason, DatasetMetadata, FlowDirective, SessionEvent, StreamMetrics, StreamSession,
};
use std::path::{Path, PathBuf};

use config::Config;

/// Replays a point stream capture through an ingestion session.
#[derive(Parser, Debug)]
#[command(name = "stream_replay")]
#[command(about = "Replays a captured point stream and prints session statistics")]
struct Args {
	/// Captured binary stream.
	#[arg(short, long, required_unless_present = "dataset")]
	input: Option<PathBuf>,

	/// Preprocessed dataset directory (metadata.json + tiles/<id>.bin).
	#[arg(short, long, conflicts_with = "input")]
	dataset: Option<PathBuf>,

	/// Tile query box for --dataset: min_x,min_y,max_x,max_y.
	#[arg(long, value_delimiter = ',', requires = "dataset", allow_hyphen_values = true)]
	bbox: Option<Vec<f64>>,

	/// Path to configuration TOML file.
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Bytes per submitted fragment (overrides the config).
	#[arg(short, long)]
	fragment_size: Option<usize>,

	/// Camera position x,y,z for the final LOD query (overrides the config).
	#[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
	camera: Option<Vec<f32>>,

	/// Rebuild the index off-thread after the replay.
	#[arg(long)]
	rebuild: bool,
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => {
			println!("Loading config from: {}", path.display());
			Config::load(path)?
		}
		None => Config::default(),
	};

	let fragment_size = args.fragment_size.or(config.fragment_size).unwrap_or(1460);
	if fragment_size == 0 {
		anyhow::bail!("fragment size must be at least 1");
	}
	let camera = match (args.camera.as_deref(), config.camera) {
		(Some([x, y, z]), _) => Vec3::new(*x, *y, *z),
		(Some(other), _) => anyhow::bail!("--camera takes x,y,z, got {} values", other.len()),
		(None, Some(c)) => Vec3::from_array(c),
		(None, None) => Vec3::ZERO,
	};
	if let Some(bbox) = &args.bbox {
		if bbox.len() != 4 {
			anyhow::bail!("--bbox takes min_x,min_y,max_x,max_y, got {} values", bbox.len());
		}
	}

	let mut session = StreamSession::new(config.session).context("Creating session")?;
	let events = session.subscribe();

	match (&args.input, &args.dataset) {
		(Some(input), _) => replay_capture(&mut session, input, fragment_size)?,
		(None, Some(dataset)) => replay_dataset(&mut session, dataset, args.bbox.as_deref())?,
		(None, None) => unreachable!("clap requires --input or --dataset"),
	}

	let snapshots = session.close(CloseReason::TransportClosed);
	println!("\nClosed session, {} final snapshots", snapshots.len());
	drop(snapshots);

	let mut rejected_events = 0;
	for event in events.try_iter() {
		match event {
			SessionEvent::Control(message) => log::debug!("control: {:?}", message),
			SessionEvent::Rejected(err) => {
				rejected_events += 1;
				log::warn!("rejected: {}", err);
			}
			SessionEvent::Flushed { source_id, points } => {
				log::debug!("flushed {} points of {}", points, source_id)
			}
			SessionEvent::Closed(reason) => log::info!("closed: {:?}", reason),
		}
	}

	if args.rebuild {
		let mut builder = AsyncIndexBuilder::new();
		builder.start(BuildRequest::from_tree(session.index()));
		if let Some(tree) = builder.wait() {
			println!("Rebuilt index: {} leaves", tree.leaf_count());
			session.replace_index(tree);
		}
	}

	let slices = session.query_lod(camera);
	let lod_points: usize = slices.iter().map(|s| s.point_count()).sum();

	print_report(&session.metrics(), rejected_events);
	println!(
		"Index: {} points, {} nodes, {} leaves",
		session.index().total_points(),
		session.index().node_count(),
		session.index().leaf_count()
	);
	println!(
		"LOD at ({:.1}, {:.1}, {:.1}): {} slices, {} points",
		camera.x,
		camera.y,
		camera.z,
		slices.len(),
		lod_points
	);
	println!("Sources: {}", session.known_sources().join(", "));

	Ok(())
}

/// Submit a capture in fixed-size fragments, ticking while paused.
fn replay_capture(session: &mut StreamSession, input: &Path, fragment_size: usize) -> Result<()> {
	let bytes = std::fs::read(input)
		.with_context(|| format!("Failed to read capture: {}", input.display()))?;
	println!(
		"Replaying {} bytes from {} in {}-byte fragments",
		bytes.len(),
		input.display(),
		fragment_size
	);

	let directives = session.outbound();
	let mut paused = false;
	for fragment in bytes.chunks(fragment_size) {
		session.submit_bytes(fragment)?;

		loop {
			for directive in directives.try_iter() {
				log::info!("producer <- {}", directive.as_token());
				paused = directive == FlowDirective::Pause;
			}
			if !paused {
				break;
			}
			session.tick();
		}
	}

	while session.tick() > 0 {}
	session.submit_text(r#"{"type":"complete"}"#)?;
	Ok(())
}

/// Load the tiles of a dataset directory, optionally limited to a box.
fn replay_dataset(session: &mut StreamSession, dir: &Path, bbox: Option<&[f64]>) -> Result<()> {
	let metadata_path = dir.join("metadata.json");
	let text = std::fs::read_to_string(&metadata_path)
		.with_context(|| format!("Failed to read {}", metadata_path.display()))?;
	let dataset = DatasetMetadata::from_json(&text)?;

	let ids: Vec<String> = match bbox {
		Some([min_x, min_y, max_x, max_y]) => dataset.query_tiles(*min_x, *min_y, *max_x, *max_y),
		_ => dataset.tiles.keys().cloned().collect(),
	};
	println!("Loading {} of {} tiles from {}", ids.len(), dataset.tiles.len(), dir.display());

	for id in &ids {
		let path = dir.join("tiles").join(format!("{id}.bin"));
		let bytes = std::fs::read(&path)
			.with_context(|| format!("Failed to read tile: {}", path.display()))?;
		// Rejected tiles are reported through session events and metrics.
		if session.submit_tile(&dataset, id, &bytes).is_err() {
			continue;
		}
		session.tick();
	}

	while session.tick() > 0 {}
	session.flush_all();
	Ok(())
}

fn print_report(metrics: &StreamMetrics, rejected_events: usize) {
	let d = &metrics.decoder;
	println!("\nDecoder:");
	println!("  bytes received:    {}", d.bytes_received);
	println!("  frames decoded:    {}", d.frames_decoded);
	println!("  points decoded:    {}", d.points_decoded);
	println!("  framing errors:    {}", d.framing_errors);
	println!("  schema errors:     {}", d.schema_errors);
	println!("  desyncs:           {}", d.desyncs);

	let p = &metrics.pools;
	println!("Pools:");
	println!("  chunks inserted:   {}", p.chunks_inserted);
	println!("  growths:           {}", p.growths);
	println!("  snapshots:         {}", p.snapshots_flushed);
	println!("  recycled/fallback: {}/{}", p.storage_recycled, p.fallback_allocations);

	let f = &metrics.flow;
	println!("Flow:");
	println!("  pause/resume:      {}/{}", f.pause_directives, f.resume_directives);
	println!("  peak pending:      {}", f.peak_pending);

	println!("Rejected: {} total, {} reported", metrics.total_rejected(), rejected_events);
}
