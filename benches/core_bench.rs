//! Benchmarks for rbox core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rbox::core::env::{self, Capabilities, EnvInputs};
use rbox::core::hasher;
use rbox::core::loader::Loader;
use rbox::core::registry::Registry;
use rbox::lang::parser::parse;
use rbox::lang::value::{get_attr, set_attr, Module, NativeObject, Namespace, Value};
use std::rc::Rc;

fn environment(staging: &std::path::Path) -> Rc<Namespace> {
    let registry = Rc::new(Registry::new());
    let inputs = EnvInputs {
        args: Vec::new(),
        verbose: false,
        test_hook: None,
        print: Rc::new(|_: &str| {}),
        start_ns: env::now_ns(),
    };
    Rc::new(env::build(inputs, &Capabilities::staging(staging), &registry))
}

/// A script defining `n` units, each with a service and a condition.
fn unit_script(n: usize) -> String {
    let mut src = String::from("units = []\n\ndef make(i):\n");
    src.push_str("    svc = systemd.Service(exec_start = '/usr/bin/app --id=%d' % i, restart = systemd.const.restart_always,\n");
    src.push_str("        conditions = [systemd.ConditionExists('/etc/app/%d.conf' % i)])\n");
    src.push_str("    return systemd.Unit(description = 'app %d' % i, after = ['network.target'], service = svc)\n\n");
    src.push_str(&format!("for i in range({}):\n    units.append(make(i))\n", n));
    src
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for n in [1, 10, 100] {
        let src = unit_script(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &src, |b, src| {
            b.iter(|| {
                let program = parse(black_box(src), "bench.box").unwrap();
                black_box(program);
            });
        });
    }
    group.finish();
}

fn bench_parse_exec(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let env = environment(dir.path());

    let mut group = c.benchmark_group("parse_exec");
    for n in [1, 10, 100] {
        let src = unit_script(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &src, |b, src| {
            b.iter(|| {
                let loader = Loader::new(env.clone(), Vec::new());
                let module: Rc<Module> = loader.exec("bench.box", black_box(src)).unwrap();
                black_box(module.global("units"));
                loader.clear();
                module.globals.borrow_mut().clear();
            });
        });
    }
    group.finish();
}

fn bench_attr_dispatch(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let loader = Loader::new(environment(dir.path()), Vec::new());
    let module = loader.exec("bench.box", &unit_script(1)).unwrap();
    let unit = match module.global("units") {
        Some(Value::List(units)) => units.borrow()[0].clone(),
        _ => panic!("units is not a list"),
    };
    c.bench_function("attr_get_field", |b| {
        b.iter(|| black_box(get_attr(black_box(&unit), "description").unwrap()));
    });
    c.bench_function("attr_get_method", |b| {
        b.iter(|| black_box(get_attr(black_box(&unit), "append_after").unwrap()));
    });
    c.bench_function("attr_set_field", |b| {
        let value = Value::str("bench unit");
        b.iter(|| set_attr(black_box(&unit), "description", value.clone()).unwrap());
    });
    c.bench_function("attr_get_nested", |b| {
        b.iter(|| {
            let svc = get_attr(black_box(&unit), "service").unwrap();
            black_box(get_attr(&svc, "exec_start").unwrap())
        });
    });
}

fn bench_render_hash(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let loader = Loader::new(environment(dir.path()), Vec::new());
    let module = loader
        .exec(
            "bench.box",
            "p = net.StaticProfile(interface = 'eth0', network = '192.168.1.5/24', routers = ['192.168.1.1'], dns = ['8.8.8.8'])\nclient = net.DHCPClient(profiles = [p, p, p])\n",
        )
        .unwrap();
    let Some(Value::Native(client)) = module.global("client") else {
        panic!("client is not a native object");
    };

    c.bench_function("render_dhcp_client", |b| {
        b.iter(|| black_box(client.render()));
    });
    c.bench_function("content_hash_dhcp_client", |b| {
        b.iter(|| black_box(client.content_hash()));
    });

    let mut group = c.benchmark_group("hash_string");
    for size in [64, 1024, 4096] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| black_box(hasher::hash_string(black_box(input))));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_parse_exec,
    bench_attr_dispatch,
    bench_render_hash
);
criterion_main!(benches);
