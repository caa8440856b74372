use lifetiles::algorithms::rebuild::{CancelToken, IndexSnapshot, RebuildRequest};
use lifetiles::viewport::Viewport;
use lifetiles::{Graph, SegmentContent, SequenceSegment, ViewConfig};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

fn build_bubble_graph(segments_target: usize, genomes: u32) -> Graph {
    let mut g = Graph::new();
    // Alternating shared runs and per-genome bubbles of varying length
    let ids: Vec<u32> = (0..genomes).map(|i| g.intern_sequence(&format!("g{}", i)).unwrap()).collect();
    let all: BTreeSet<u32> = ids.iter().copied().collect();
    let mut x = 0u64;
    let mut prev: Vec<u32> = Vec::new();
    while (g.segment_count() as usize) < segments_target {
        let shared = g.add_vertex(SequenceSegment { start: x, end: x + 50, unified_start: x, unified_end: x + 50, content: SegmentContent::Collapsed { length: 50 }, sources: all.clone(), mutation: None }).unwrap();
        for p in prev.drain(..) { let _ = g.add_edge(p, shared); }
        x += 50;
        let mut end = x;
        for (k, id) in ids.iter().enumerate() {
            let len = 5 + (k as u64 * 7) % 40;
            let s = g.add_vertex(SequenceSegment { start: x, end: x + len, unified_start: x, unified_end: x + len, content: SegmentContent::Sequence("A".repeat(len as usize)), sources: [*id].into_iter().collect(), mutation: None }).unwrap();
            let _ = g.add_edge(shared, s);
            prev.push(s);
            end = end.max(x + len);
        }
        x = end;
    }
    g
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() { return 0.0; }
    let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[idx.min(sorted.len()-1)]
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let mut segments = 200_000usize;
    let mut genomes = 8u32;
    let mut frames = 2000usize;
    let mut thumb = 0.002f64;
    let mut assert_ms: Option<f64> = None;
    for a in &args[1..] {
        if let Some(val)=a.strip_prefix("--segments=") { if let Ok(v)=val.parse() { segments=v; } }
        else if let Some(val)=a.strip_prefix("--genomes=") { if let Ok(v)=val.parse() { genomes=v; } }
        else if let Some(val)=a.strip_prefix("--frames=") { if let Ok(v)=val.parse() { frames=v; } }
        else if let Some(val)=a.strip_prefix("--thumb=") { if let Ok(v)=val.parse() { thumb=v; } }
        else if let Some(val)=a.strip_prefix("--assert-ms=") { if let Ok(v)=val.parse() { assert_ms=Some(v); } }
    }

    let g = Arc::new(build_bubble_graph(segments, genomes.max(1)));
    let cfg = ViewConfig::default();
    let t_build = Instant::now();
    let snap = IndexSnapshot::build(RebuildRequest { graph: g.clone(), visible: None, bucket_width: cfg.bucket_width, target_per_bucket: cfg.target_segments_per_bucket, max_stack_depth: cfg.max_stack_depth }, &CancelToken::never()).unwrap();
    let build_ms = t_build.elapsed().as_secs_f64() * 1000.0;
    let vp = Viewport::new(cfg);
    let max = g.max_unified_end();

    // Sweep the scroll bar left to right
    let mut times_ms: Vec<f64> = Vec::with_capacity(frames);
    let start_all = Instant::now();
    let mut tiles = 0usize;
    for k in 0..frames {
        let h = k as f64 / frames.max(1) as f64;
        let t0 = Instant::now();
        let (s, e) = vp.bucket_range(&snap.buckets, h, thumb, max).unwrap();
        tiles += snap.layout(s, e).len();
        let dt = t0.elapsed().as_secs_f64() * 1000.0;
        times_ms.push(dt);
    }
    let dur_all = start_all.elapsed().as_secs_f64() * 1000.0;
    times_ms.sort_by(|a,b| a.total_cmp(b));
    let med = percentile(&times_ms, 0.5);
    let p90 = percentile(&times_ms, 0.9);
    let p99 = percentile(&times_ms, 0.99);
    println!("segments={} genomes={} buckets={} frames={} tiles={} build_ms={:.3} total_ms={:.3} median_ms={:.4} p90_ms={:.4} p99_ms={:.4}", g.segment_count(), genomes, snap.buckets.number_buckets(), frames, tiles, build_ms, dur_all, med, p90, p99);
    if let Some(th) = assert_ms { if med > th { eprintln!("FAIL: median {:.4} ms > threshold {:.3} ms", med, th); std::process::exit(1); } }
}
