//! Micro-benchmarks for the hot paths: registry notification, setter
//! writes, array diff recording and computed recomputation.

use std::cell::Cell;
use std::rc::Rc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use grappelli_observation::{
	ChangeFlags, ComputedObserver, IndexMap, Observable, ObservedArray, ObservedObject,
	ObserverLocator, Subscriber, SubscriberRecord, Value,
};

struct NullSubscriber {
	hits: Cell<u64>,
}

impl Subscriber for NullSubscriber {
	fn handle_change(
		&self,
		_new: &Value,
		_old: &Value,
		_flags: ChangeFlags,
	) -> grappelli_observation::Result<()> {
		self.hits.set(self.hits.get() + 1);
		Ok(())
	}

	fn handle_collection_change(
		&self,
		_map: &IndexMap,
		_flags: ChangeFlags,
	) -> grappelli_observation::Result<()> {
		self.hits.set(self.hits.get() + 1);
		Ok(())
	}
}

fn bench_registry_notify(c: &mut Criterion) {
	let mut group = c.benchmark_group("registry_notify");
	for subscribers in [1usize, 3, 8] {
		group.bench_function(format!("{subscribers}_subscribers"), |b| {
			let registry = SubscriberRecord::new();
			for _ in 0..subscribers {
				registry.add(Rc::new(NullSubscriber { hits: Cell::new(0) }) as Rc<dyn Subscriber>);
			}
			let new = Value::from(1i64);
			let old = Value::from(0i64);
			b.iter(|| {
				registry
					.notify(black_box(&new), black_box(&old), ChangeFlags::NONE)
					.unwrap();
			});
		});
	}
	group.finish();
}

fn bench_observed_property_write(c: &mut Criterion) {
	c.bench_function("setter_observer_write", |b| {
		let locator = ObserverLocator::new();
		let obj = ObservedObject::builder().data("x", 0i64).build();
		let observer = locator.get_object_observer(&obj, "x").unwrap();
		observer.subscribe(Rc::new(NullSubscriber { hits: Cell::new(0) }) as Rc<dyn Subscriber>);

		let mut n = 0i64;
		b.iter(|| {
			n += 1;
			obj.set("x", Value::from(black_box(n))).unwrap();
		});
	});
}

fn bench_array_splice_diff(c: &mut Criterion) {
	c.bench_function("array_splice_diff_100", |b| {
		let array = ObservedArray::from_values((0..100i64).map(Value::from).collect());
		array
			.observer()
			.subscribe(Rc::new(NullSubscriber { hits: Cell::new(0) }) as Rc<dyn Subscriber>);

		b.iter(|| {
			array
				.splice(black_box(50), 1, vec![Value::from(7i64)])
				.unwrap();
		});
	});
}

fn bench_computed_recompute(c: &mut Criterion) {
	c.bench_function("computed_recompute", |b| {
		let locator = ObserverLocator::new();
		let obj = ObservedObject::builder().data("x", 0i64).build();
		let source = obj.clone();
		let computed = ComputedObserver::new(&locator, move || match source.get("x")? {
			Value::Number(n) => Ok(Value::Number(n * 2.0)),
			_ => Ok(Value::Null),
		});
		computed.subscribe(Rc::new(NullSubscriber { hits: Cell::new(0) }) as Rc<dyn Subscriber>);

		let mut n = 0i64;
		b.iter(|| {
			n += 1;
			obj.set("x", Value::from(black_box(n))).unwrap();
		});
	});
}

criterion_group!(
	benches,
	bench_registry_notify,
	bench_observed_property_write,
	bench_array_splice_diff,
	bench_computed_recompute
);
criterion_main!(benches);
