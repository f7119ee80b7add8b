use berth_core::Engine;
use berth_dbaas::MockProvider;
use berth_schema::compose::{LABEL_NAME, LABEL_TYPE};
use berth_schema::{
    ComposeService, CronjobDeclaration, EnvironmentIdentity, EnvironmentOverlay,
    EnvironmentSection, FeatureFlags, Manifest, RouteDeclaration, RouteGroup,
};
use criterion::{criterion_group, criterion_main, Criterion};

const TYPES: &[&str] = &["nginx-php", "node", "cli", "mariadb", "redis", "solr"];

fn compose_services(count: usize) -> Vec<ComposeService> {
    (0..count)
        .map(|i| {
            let ty = TYPES[i % TYPES.len()];
            let mut service = ComposeService {
                name: format!("{ty}-{i:03}"),
                image: Some(format!("uselagoon/{ty}")),
                ..ComposeService::default()
            };
            service.labels.insert(LABEL_TYPE.to_owned(), ty.to_owned());
            // Every fourth service shares an override name with its predecessor.
            if i % 4 == 3 {
                let previous = format!("{}-{:03}", TYPES[(i - 1) % TYPES.len()], i - 1);
                service.labels.insert(LABEL_NAME.to_owned(), previous);
            }
            service
        })
        .collect()
}

fn manifest(count: usize) -> Manifest {
    let routes = (0..count)
        .step_by(TYPES.len())
        .map(|i| RouteGroup {
            service: format!("nginx-php-{i:03}"),
            routes: vec![
                RouteDeclaration::new(format!("site-{i}.example.com")),
                RouteDeclaration::new(format!("www.site-{i}.example.com")),
            ],
        })
        .collect();
    let cronjobs = (0..count)
        .filter(|i| i % TYPES.len() == 2)
        .map(|i| CronjobDeclaration {
            name: format!("job {i}"),
            schedule: if i % 2 == 0 { "*/5 * * * *" } else { "M H(2-4) * * *" }.to_owned(),
            command: "true".to_owned(),
            service: format!("cli-{i:03}"),
        })
        .collect();
    let mut manifest = Manifest::default();
    manifest.environments.insert(
        "main".to_owned(),
        EnvironmentSection {
            routes,
            cronjobs,
            ..EnvironmentSection::default()
        },
    );
    manifest
}

fn engine(count: usize) -> Engine {
    let identity = EnvironmentIdentity::new("bench-project", "main", "main");
    let overlay =
        EnvironmentOverlay::new(identity, manifest(count), &[], &[], FeatureFlags::default())
            .unwrap();
    Engine::new(overlay, compose_services(count)).with_dbaas(Box::new(
        MockProvider::healthy().with_environment("mariadb", "development"),
    ))
}

fn bench_resolve_services(c: &mut Criterion) {
    let engine = engine(240);
    c.bench_function("resolve_240_services", |b| {
        b.iter(|| engine.resolve_services().unwrap());
    });
}

fn bench_compile(c: &mut Criterion) {
    let engine = engine(240);
    c.bench_function("compile_240_services", |b| {
        b.iter(|| engine.compile().unwrap());
    });
}

fn bench_change_report(c: &mut Criterion) {
    let engine = engine(240);
    c.bench_function("change_report_240_services", |b| {
        b.iter(|| engine.change_report().unwrap());
    });
}

criterion_group!(
    benches,
    bench_resolve_services,
    bench_compile,
    bench_change_report
);
criterion_main!(benches);
