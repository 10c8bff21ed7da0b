//! Apache Tika over JNI for the Office formats the native decoders do not
//! cover.
//!
//! # Resource Management
//! The caller provides valid paths to:
//! - a JRE directory (must contain lib/server/libjvm.so or equivalent)
//! - a helper JAR exposing `<main_class>.parseToXhtml(byte[]) -> String`
//!
//! # JVM Lifecycle
//! Only ONE JVM can exist per process. It is created when the decoder is
//! constructed and lives for the lifetime of the process.

use super::html::walk_xhtml;
use super::{ContentHandler, Decoder, DecoderId, MediaType, ParseContext};
use crate::config::TikaConfig;
use crate::error::DecodeError;
use crate::metadata::Metadata;
use anyhow::{anyhow, Context, Result};
use jni::{InitArgsBuilder, JNIVersion, JavaVM};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const PARSE_METHOD: &str = "parseToXhtml";
const PARSE_SIGNATURE: &str = "([B)Ljava/lang/String;";

const OFFICE_TYPES: &[&str] = &[
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "application/vnd.ms-outlook",
    "application/x-tika-msoffice",
    "application/rtf",
    "application/epub+zip",
];

/// Office decoder backed by an embedded JVM running Tika.
///
/// Input bytes are copied to a Java `byte[]`, the XHTML result is copied
/// back and walked like any other markup. JNI local references are released
/// after each call.
pub struct TikaJniDecoder {
    jvm: Arc<JavaVM>,
    main_class: String,
}

// JNI works across threads once each thread is attached.
unsafe impl Send for TikaJniDecoder {}
unsafe impl Sync for TikaJniDecoder {}

impl TikaJniDecoder {
    /// Start the JVM described by `config`.
    ///
    /// Always sets `-Djava.class.path=<jar_path>` and
    /// `-Djava.awt.headless=true`; adds `-Xms512m`/`-Xmx512m` unless the
    /// configured JVM arguments choose a heap.
    pub fn new(config: &TikaConfig) -> Result<Self> {
        let jre_path = config
            .jre_path
            .as_deref()
            .context("tika.jre_path is not set")?;
        let jar_path = config
            .jar_path
            .as_deref()
            .context("tika.jar_path is not set")?;

        if !jre_path.exists() {
            return Err(anyhow!("JRE not found at: {}", jre_path.display()));
        }
        if !jar_path.exists() {
            return Err(anyhow!("JAR not found at: {}", jar_path.display()));
        }

        let libjvm_path = find_libjvm(jre_path)?;
        info!(
            "Starting JVM for Tika (JRE {}, JAR {}, libjvm {})",
            jre_path.display(),
            jar_path.display(),
            libjvm_path.display()
        );

        // The jni crate locates the JVM through JAVA_HOME.
        std::env::set_var("JAVA_HOME", jre_path);
        setup_library_path(jre_path);

        let classpath = format!("-Djava.class.path={}", jar_path.display());
        let mut args = InitArgsBuilder::new()
            .version(JNIVersion::V8)
            .option(&classpath)
            .option("-Djava.awt.headless=true");

        if !config.jvm_args.iter().any(|arg| arg.starts_with("-Xms")) {
            args = args.option("-Xms512m");
        }
        if !config.jvm_args.iter().any(|arg| arg.starts_with("-Xmx")) {
            args = args.option("-Xmx512m");
        }
        for arg in &config.jvm_args {
            debug!("JVM arg: {}", arg);
            args = args.option(arg);
        }

        let args = args
            .build()
            .map_err(|e| anyhow!("Failed to build JVM args: {:?}", e))?;
        let jvm = JavaVM::new(args).map_err(|e| anyhow!("Failed to create JVM: {:?}", e))?;

        Ok(Self {
            jvm: Arc::new(jvm),
            main_class: config.main_class.to_string(),
        })
    }

    fn parse_to_xhtml(&self, input: &[u8]) -> Result<String> {
        let mut env = self
            .jvm
            .attach_current_thread()
            .map_err(|e| anyhow!("Failed to attach thread to JVM: {:?}", e))?;

        let java_bytes = env
            .byte_array_from_slice(input)
            .map_err(|e| anyhow!("Failed to create Java byte array: {:?}", e))?;

        let result = env.call_static_method(
            self.main_class.as_str(),
            PARSE_METHOD,
            PARSE_SIGNATURE,
            &[(&java_bytes).into()],
        );

        if env
            .exception_check()
            .map_err(|e| anyhow!("Failed to check for exception: {:?}", e))?
        {
            env.exception_describe()
                .map_err(|e| anyhow!("Failed to describe exception: {:?}", e))?;
            env.exception_clear()
                .map_err(|e| anyhow!("Failed to clear exception: {:?}", e))?;
            return Err(anyhow!("Java exception in {}.{}", self.main_class, PARSE_METHOD));
        }

        let jstring = result
            .map_err(|e| anyhow!("JNI call failed: {:?}", e))?
            .l()
            .map_err(|e| anyhow!("Expected String result: {:?}", e))?;

        let output: String = env
            .get_string((&jstring).into())
            .map_err(|e| anyhow!("Failed to convert Java string: {:?}", e))?
            .into();
        Ok(output)
    }
}

impl Decoder for TikaJniDecoder {
    fn id(&self) -> DecoderId {
        DecoderId::TIKA
    }

    fn supported_types(&self) -> Vec<MediaType> {
        OFFICE_TYPES.iter().copied().map(MediaType::from).collect()
    }

    fn decode(
        &self,
        input: &[u8],
        handler: &mut dyn ContentHandler,
        metadata: &mut Metadata,
        _context: &ParseContext<'_>,
    ) -> Result<(), DecodeError> {
        debug!("Sending {} bytes through JNI", input.len());
        let xhtml = self
            .parse_to_xhtml(input)
            .map_err(|e| DecodeError::Backend(format!("{e:#}")))?;
        walk_xhtml(&xhtml, handler, metadata)
    }
}

fn find_libjvm(jre_path: &Path) -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    let candidates = [
        jre_path.join("lib/server/libjvm.dylib"),
        jre_path.join("lib/libjvm.dylib"),
    ];

    #[cfg(target_os = "linux")]
    let candidates = [
        jre_path.join("lib/server/libjvm.so"),
        jre_path.join("lib/libjvm.so"),
    ];

    #[cfg(target_os = "windows")]
    let candidates = [
        jre_path.join("bin/server/jvm.dll"),
        jre_path.join("bin/jvm.dll"),
    ];

    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| anyhow!("Could not find libjvm in JRE at {}", jre_path.display()))
}

/// Prepend the JRE's native library directories to the loader path.
fn setup_library_path(jre_path: &Path) {
    let lib_path = jre_path.join("lib");
    let server_path = jre_path.join("lib/server");

    #[cfg(target_os = "macos")]
    let (variable, separator) = ("DYLD_LIBRARY_PATH", ":");
    #[cfg(target_os = "linux")]
    let (variable, separator) = ("LD_LIBRARY_PATH", ":");
    #[cfg(target_os = "windows")]
    let (variable, separator) = ("PATH", ";");

    let current = std::env::var(variable).unwrap_or_default();
    std::env::set_var(
        variable,
        format!(
            "{}{sep}{}{sep}{}",
            server_path.display(),
            lib_path.display(),
            current,
            sep = separator
        ),
    );
}
