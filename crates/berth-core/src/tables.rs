//! Static lookup tables used by service resolution.

/// Legacy service types and the type they resolve to today.
pub const LEGACY_TYPE_REMAP: &[(&str, &str)] = &[
    ("mariadb-shared", "mariadb-dbaas"),
    ("postgres-shared", "postgres-dbaas"),
    ("mongo-shared", "mongodb-dbaas"),
    ("python-ckandatapusher", "python"),
    ("mongo", "mongodb"),
];

/// Types that may own autogenerated routes.
pub const ROUTE_CAPABLE_TYPES: &[&str] = &[
    "basic",
    "basic-persistent",
    "node",
    "node-persistent",
    "nginx",
    "nginx-php",
    "nginx-php-persistent",
    "varnish",
    "varnish-persistent",
    "python-persistent",
    "python",
];

/// Types provisioned externally, with no image to build or pull.
pub const IMAGELESS_TYPES: &[&str] = &["mariadb-dbaas", "postgres-dbaas", "mongodb-dbaas"];

/// Database types eligible for DBaaS provisioning.
pub const DATABASE_TYPES: &[&str] = &[
    "mariadb",
    "mariadb-dbaas",
    "postgres",
    "postgres-dbaas",
    "mongodb",
    "mongodb-dbaas",
];

/// Types whose data is worth backing up.
pub const BACKUP_TYPES: &[&str] = &[
    "basic-persistent",
    "node-persistent",
    "nginx-php-persistent",
    "python-persistent",
    "varnish-persistent",
    "redis-persistent",
    "solr",
    "elasticsearch",
    "opensearch",
    "rabbitmq",
    "mongodb-dbaas",
    "mariadb-dbaas",
    "postgres-dbaas",
    "mariadb-single",
    "postgres-single",
    "mongodb-single",
];

/// Types that run two replicas in production.
pub const PRODUCTION_REPLICA_TYPES: &[&str] =
    &["nginx", "nginx-persistent", "nginx-php", "nginx-php-persistent"];

pub const DEFAULT_VOLUME_SIZE: &str = "5Gi";

/// Default persistent volume mount path per type.
pub const DEFAULT_VOLUME_PATHS: &[(&str, &str)] = &[
    ("elasticsearch", "/usr/share/elasticsearch/data"),
    ("opensearch", "/usr/share/opensearch/data"),
    ("mariadb-single", "/var/lib/mysql"),
    ("postgres-single", "/var/lib/postgresql/data"),
    ("mongodb-single", "/data/db"),
    ("varnish-persistent", "/var/cache/varnish"),
    ("rabbitmq", "/var/lib/rabbitmq"),
    ("redis-persistent", "/data"),
    ("solr", "/var/solr"),
];

pub fn legacy_remap(service_type: &str) -> Option<&'static str> {
    LEGACY_TYPE_REMAP
        .iter()
        .find(|(old, _)| *old == service_type)
        .map(|(_, new)| *new)
}

pub fn is_route_capable(service_type: &str) -> bool {
    ROUTE_CAPABLE_TYPES.contains(&service_type)
}

pub fn is_imageless(service_type: &str) -> bool {
    IMAGELESS_TYPES.contains(&service_type)
}

pub fn is_database(service_type: &str) -> bool {
    DATABASE_TYPES.contains(&service_type)
}

pub fn has_backups(service_type: &str) -> bool {
    BACKUP_TYPES.contains(&service_type)
}

pub fn has_production_replicas(service_type: &str) -> bool {
    PRODUCTION_REPLICA_TYPES.contains(&service_type)
}

/// Default `(path, size)` of the persistent volume for a type.
pub fn default_volume(service_type: &str) -> Option<(&'static str, &'static str)> {
    DEFAULT_VOLUME_PATHS
        .iter()
        .find(|(ty, _)| *ty == service_type)
        .map(|(_, path)| (*path, DEFAULT_VOLUME_SIZE))
}
