//! Static table of supported backends and their defaults.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of a supported database product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Mysql,
    Oracle,
    Mssql,
    Teradata,
    Postgres,
    Greenplum,
    Db2,
    Ase,
    Progress,
    Maxdb,
    Ingres,
    Vector,
    Asa,
    Iq,
    Hana,
    Zen,
    Matrix,
    Vectorh,
    Actianx,
    Avalanche,
    Netezza,
}

impl BackendType {
    /// The identifier used in connection strings.
    pub fn as_str(self) -> &'static str {
        descriptor(self).name
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(s).map(|d| d.backend)
    }
}

/// Whether SELECT results are read into memory right after execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPolicy {
    Eager,
    Lazy,
}

/// How pending work is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// The session runs in autocommit mode; commit does nothing.
    None,
    /// Commit by executing a literal statement.
    Statement(&'static str),
    /// Commit through the client's own commit call.
    Native,
}

/// What closing a handle does with the vendor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicy {
    Close,
    /// The client must not be closed explicitly; the session is only released.
    Leave,
}

/// Defaults and behavior of one backend.
#[derive(Debug, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub backend: BackendType,
    pub name: &'static str,
    pub default_database: &'static str,
    pub default_port: &'static str,
    pub dsn_template_key: &'static str,
    pub fetch: FetchPolicy,
    pub commit: CommitPolicy,
    pub close: ClosePolicy,
}

impl BackendDescriptor {
    /// True when the session should run with autocommit enabled.
    pub fn autocommit(&self) -> bool {
        self.commit == CommitPolicy::None
    }
}

macro_rules! backends {
    ($( $ty:ident $name:literal db=$db:literal port=$port:literal $fetch:ident $commit:expr, $close:ident; )*) => {
        static DESCRIPTORS: &[BackendDescriptor] = &[
            $(BackendDescriptor {
                backend: BackendType::$ty,
                name: $name,
                default_database: $db,
                default_port: $port,
                dsn_template_key: $name,
                fetch: FetchPolicy::$fetch,
                commit: $commit,
                close: ClosePolicy::$close,
            },)*
        ];
    };
}

use CommitPolicy::{Native, Statement};
const NONE: CommitPolicy = CommitPolicy::None;

backends! {
    Mysql     "mysql"     db="mysql"       port="3306" Lazy  NONE, Close;
    Oracle    "oracle"    db="sys"         port="1521" Lazy  NONE, Close;
    Mssql     "mssql"     db="master"      port="1433" Lazy  NONE, Close;
    Teradata  "teradata"  db="dbc"         port="1025" Eager NONE, Leave;
    Postgres  "postgres"  db="postgres"    port="5432" Lazy  NONE, Close;
    Greenplum "greenplum" db="postgres"    port="5432" Lazy  NONE, Close;
    Db2       "db2"       db="dsndd04"     port="446"  Eager Statement("commit"), Close;
    Ase       "ase"       db="master"      port="5000" Lazy  NONE, Close;
    Progress  "progress"  db="sysprogress" port="8104" Lazy  NONE, Leave;
    Maxdb     "maxdb"     db="sysinfo"     port="7200" Lazy  NONE, Leave;
    Ingres    "ingres"    db="iidbdb"      port="II"   Eager NONE, Close;
    Vector    "vector"    db="iidbdb"      port="VW"   Eager NONE, Close;
    Asa       "asa"       db="sys"         port="2638" Eager Native, Close;
    Iq        "iq"        db="sys"         port="2638" Eager Native, Close;
    Hana      "hana"      db="sys"         port="00"   Eager NONE, Close;
    Zen       "zen"       db="demodata"    port="1531" Lazy  NONE, Close;
    Matrix    "matrix"    db="dev"         port="1439" Lazy  NONE, Close;
    Vectorh   "vectorh"   db="iidbdb"      port="VH"   Eager NONE, Close;
    Actianx   "actianx"   db="iidbdb"      port="II"   Eager NONE, Close;
    Avalanche "avalanche" db="db"          port="VW"   Eager NONE, Close;
    Netezza   "netezza"   db="nz"          port="5480" Eager NONE, Leave;
}

/// All registered backends, in table order.
pub fn all() -> &'static [BackendDescriptor] {
    DESCRIPTORS
}

/// Looks up a backend by its connection-string identifier.
pub fn lookup(name: &str) -> Result<&'static BackendDescriptor, Error> {
    DESCRIPTORS
        .iter()
        .find(|d| d.name == name)
        .ok_or_else(|| Error::UnknownBackendType(name.to_string()))
}

/// Returns the descriptor of a backend.
pub fn descriptor(backend: BackendType) -> &'static BackendDescriptor {
    // Every variant has a row; the table test guards this.
    DESCRIPTORS
        .iter()
        .find(|d| d.backend == backend)
        .unwrap_or_else(|| unreachable!("no descriptor for {:?}", backend))
}
