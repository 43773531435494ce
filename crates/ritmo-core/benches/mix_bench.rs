//! Benchmarks for the render-path hot spots: buffer merging and event mixing.

use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use ritmo_core::{AudioBuffer, AudioEvent, Sample};

fn bench_merge(c: &mut Criterion) {
    let mut source = AudioBuffer::new(2, 512);
    for channel in 0..2 {
        for (i, s) in source.channel_mut(channel).iter_mut().enumerate() {
            *s = ((i as Sample) / 512.0).sin();
        }
    }

    c.bench_function("merge_512_stereo", |b| {
        let mut target = AudioBuffer::new(2, 512);
        b.iter(|| {
            target.merge_from(std::hint::black_box(&source), 0, 0, 0.8);
        });
    });
}

fn bench_mix_event(c: &mut Criterion) {
    let mut sample = AudioBuffer::new(2, 4096);
    for channel in 0..2 {
        for (i, s) in sample.channel_mut(channel).iter_mut().enumerate() {
            *s = ((i as Sample) / 128.0).sin();
        }
    }
    let sample = Arc::new(sample);

    c.bench_function("mix_event_512_window", |b| {
        let mut event = AudioEvent::sample(Arc::clone(&sample), 0, 4096);
        let mut output = AudioBuffer::new(2, 512);
        b.iter(|| {
            output.silence();
            event.mix_into(&mut output, 1024, 0, 88199, false, 0, false);
        });
    });

    c.bench_function("mix_event_512_window_loop_wrap", |b| {
        let mut event = AudioEvent::sample(Arc::clone(&sample), 0, 4096);
        let mut output = AudioBuffer::new(2, 512);
        b.iter(|| {
            output.silence();
            event.mix_into(&mut output, 88000, 0, 88199, true, 200, false);
        });
    });
}

criterion_group!(benches, bench_merge, bench_mix_event);
criterion_main!(benches);
