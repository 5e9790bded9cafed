//! Contract synthesis and compilation.
//!
//! A contract is a minimal proto3 schema generated from a service name and a
//! capability set:
//!
//! ```text
//! syntax = "proto3";
//! package <service>;
//!
//! message Request {
//!     string payload = 1;
//! }
//!
//! message Response {
//!     string payload = 1;
//! }
//!
//! message Empty {
//! }
//!
//! service <service>Rpc {
//!     rpc <capability>(Request) returns (Response);
//! }
//! ```
//!
//! The text is written to a transient file, compiled by a [`ContractCompiler`]
//! into a descriptor pool, checked against the expected shape, and the file is
//! removed. Server and client build the same contract independently from the
//! same inputs; request and response bodies are encoded as protobuf messages
//! of the compiled procedure's input and output types.

use crate::capability::CapabilitySet;
use crate::transport::protocol::{Request, Response};
use crate::{AutoRpcError, Result};
use prost::Message;
use prost_reflect::{
    DescriptorPool, DynamicMessage, Kind, MessageDescriptor, MethodDescriptor as ProcedureDescriptor,
    ServiceDescriptor,
};
use std::io::Write;
use std::path::Path;
use tracing::debug;

pub const REQUEST_MESSAGE: &str = "Request";
pub const RESPONSE_MESSAGE: &str = "Response";
pub const EMPTY_MESSAGE: &str = "Empty";
pub const PAYLOAD_FIELD: &str = "payload";

/// Name of the generated service for `service_name`.
pub fn service_ident(service_name: &str) -> String {
    format!("{}Rpc", service_name)
}

/// Generate contract text. Identical inputs give byte-identical output.
pub fn synthesize(service_name: &str, capabilities: &CapabilitySet) -> String {
    let procedures: String = capabilities
        .iter()
        .map(|name| {
            format!(
                "    rpc {}({}) returns ({});\n",
                name, REQUEST_MESSAGE, RESPONSE_MESSAGE
            )
        })
        .collect();

    format!(
        "syntax = \"proto3\";\n\
         package {package};\n\
         \n\
         message {request} {{\n    string {field} = 1;\n}}\n\
         \n\
         message {response} {{\n    string {field} = 1;\n}}\n\
         \n\
         message {empty} {{\n}}\n\
         \n\
         service {service} {{\n{procedures}}}\n",
        package = service_name,
        request = REQUEST_MESSAGE,
        response = RESPONSE_MESSAGE,
        empty = EMPTY_MESSAGE,
        field = PAYLOAD_FIELD,
        service = service_ident(service_name),
        procedures = procedures,
    )
}

/// Compiles contract source files into a descriptor pool.
pub trait ContractCompiler: Send + Sync {
    fn compile(&self, path: &Path) -> std::result::Result<DescriptorPool, String>;
}

/// Compiler backed by `protox`, resolving imports next to the contract file
/// and from the well-known types.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtoxCompiler;

impl ContractCompiler for ProtoxCompiler {
    fn compile(&self, path: &Path) -> std::result::Result<DescriptorPool, String> {
        let dir = path
            .parent()
            .ok_or_else(|| format!("{} has no parent directory", path.display()))?;
        let file = path
            .file_name()
            .ok_or_else(|| format!("{} is not a file", path.display()))?;

        let mut compiler = protox::Compiler::new([dir]).map_err(|e| e.to_string())?;
        compiler
            .include_imports(true)
            .open_file(file)
            .map_err(|e| e.to_string())?;
        Ok(compiler.descriptor_pool())
    }
}

/// True if `message` is exactly `{ string payload = 1; }`.
fn is_payload_message(message: &MessageDescriptor) -> bool {
    let mut fields = message.fields();
    match (fields.next(), fields.next()) {
        (Some(field), None) => {
            field.name() == PAYLOAD_FIELD
                && field.number() == 1
                && field.kind() == Kind::String
                && !field.is_list()
                && !field.is_map()
        }
        _ => false,
    }
}

fn encode_payload(message: &MessageDescriptor, payload: &str) -> Result<Vec<u8>> {
    let mut dynamic = DynamicMessage::new(message.clone());
    dynamic
        .try_set_field_by_name(
            PAYLOAD_FIELD,
            prost_reflect::Value::String(payload.to_string()),
        )
        .map_err(|e| AutoRpcError::Encoding {
            message: format!("cannot set {}.{}: {}", message.full_name(), PAYLOAD_FIELD, e),
        })?;
    Ok(dynamic.encode_to_vec())
}

fn decode_payload(message: &MessageDescriptor, bytes: &[u8]) -> Result<String> {
    let dynamic = DynamicMessage::decode(message.clone(), bytes).map_err(|e| {
        AutoRpcError::Encoding {
            message: format!("invalid {} message: {}", message.full_name(), e),
        }
    })?;
    dynamic
        .get_field_by_name(PAYLOAD_FIELD)
        .and_then(|value| value.as_str().map(str::to_string))
        .ok_or_else(|| AutoRpcError::Encoding {
            message: format!("{} carries no {} text", message.full_name(), PAYLOAD_FIELD),
        })
}

/// A compiled, validated contract owned by one server or connection.
#[derive(Debug, Clone)]
pub struct GeneratedContract {
    pub service_name: String,
    /// Generated service identifier, `<service_name>Rpc`.
    pub service: String,
    pub procedures: CapabilitySet,
    pub pool: DescriptorPool,
    pub service_type: ServiceDescriptor,
    pub request_type: MessageDescriptor,
    pub response_type: MessageDescriptor,
    pub empty_type: MessageDescriptor,
    /// Contract text the descriptors were compiled from.
    pub source: String,
}

impl GeneratedContract {
    /// Synthesize and compile with [`ProtoxCompiler`].
    pub fn build(service_name: &str, capabilities: &CapabilitySet) -> Result<Self> {
        Self::build_with(service_name, capabilities, &ProtoxCompiler)
    }

    /// Synthesize and compile with `compiler`.
    pub fn build_with(
        service_name: &str,
        capabilities: &CapabilitySet,
        compiler: &dyn ContractCompiler,
    ) -> Result<Self> {
        let fail = |message: String| AutoRpcError::ContractCompilation {
            service: service_name.to_string(),
            message,
        };

        let source = synthesize(service_name, capabilities);

        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_messages_gen", service_name))
            .suffix(".proto")
            .tempfile()?;
        file.write_all(source.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| AutoRpcError::io_with_path(e, file.path()))?;

        debug!(
            "Compiling contract for {} from {}",
            service_name,
            file.path().display()
        );
        let pool = compiler.compile(file.path()).map_err(fail)?;
        drop(file);

        let message = |name: &str| -> Result<MessageDescriptor> {
            let full_name = format!("{}.{}", service_name, name);
            pool.get_message_by_name(&full_name)
                .ok_or_else(|| fail(format!("message {} is missing", full_name)))
        };
        let payload_message = |name: &str| -> Result<MessageDescriptor> {
            let descriptor = message(name)?;
            if !is_payload_message(&descriptor) {
                return Err(fail(format!(
                    "message {} must carry exactly one string {} = 1 field",
                    descriptor.full_name(),
                    PAYLOAD_FIELD
                )));
            }
            Ok(descriptor)
        };
        let request_type = payload_message(REQUEST_MESSAGE)?;
        let response_type = payload_message(RESPONSE_MESSAGE)?;
        let empty_type = message(EMPTY_MESSAGE)?;
        if empty_type.fields().len() != 0 {
            return Err(fail(format!("message {} must be empty", empty_type.full_name())));
        }

        let service = service_ident(service_name);
        let service_type = pool
            .get_service_by_name(&format!("{}.{}", service_name, service))
            .ok_or_else(|| fail(format!("service {} is missing", service)))?;
        if service_type.methods().len() != capabilities.len() {
            return Err(fail(format!(
                "service {} declares {} procedures, expected {}",
                service,
                service_type.methods().len(),
                capabilities.len()
            )));
        }
        for procedure in service_type.methods() {
            if !capabilities.contains(procedure.name()) {
                return Err(fail(format!("unexpected procedure {}", procedure.name())));
            }
            if procedure.input() != request_type || procedure.output() != response_type {
                return Err(fail(format!(
                    "procedure {} must be ({}) returns ({})",
                    procedure.name(),
                    REQUEST_MESSAGE,
                    RESPONSE_MESSAGE
                )));
            }
        }

        Ok(Self {
            service_name: service_name.to_string(),
            service,
            procedures: capabilities.clone(),
            pool,
            service_type,
            request_type,
            response_type,
            empty_type,
            source,
        })
    }

    /// `<package>.<service>`, the first path segment of every procedure.
    pub fn qualified_service(&self) -> &str {
        self.service_type.full_name()
    }

    /// Compiled procedure named `procedure`.
    pub fn procedure(&self, procedure: &str) -> Result<ProcedureDescriptor> {
        self.service_type
            .methods()
            .find(|m| m.name() == procedure)
            .ok_or_else(|| AutoRpcError::UnknownCapability(procedure.to_string()))
    }

    /// Wire path of a procedure, or `None` if the contract does not declare it.
    pub fn procedure_path(&self, procedure: &str) -> Option<String> {
        self.procedure(procedure)
            .ok()
            .map(|m| format!("/{}/{}", self.qualified_service(), m.name()))
    }

    /// Encode `request` as the input message of `procedure`.
    pub fn encode_request(&self, procedure: &str, request: &Request) -> Result<Vec<u8>> {
        encode_payload(&self.procedure(procedure)?.input(), &request.payload)
    }

    pub fn decode_request(&self, procedure: &str, bytes: &[u8]) -> Result<Request> {
        let payload = decode_payload(&self.procedure(procedure)?.input(), bytes)?;
        Ok(Request { payload })
    }

    /// Encode `response` as the output message of `procedure`.
    pub fn encode_response(&self, procedure: &str, response: &Response) -> Result<Vec<u8>> {
        encode_payload(&self.procedure(procedure)?.output(), &response.payload)
    }

    pub fn decode_response(&self, procedure: &str, bytes: &[u8]) -> Result<Response> {
        let payload = decode_payload(&self.procedure(procedure)?.output(), bytes)?;
        Ok(Response { payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn caps(names: &[&str]) -> CapabilitySet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_synthesize_is_deterministic() {
        let a = synthesize("text_processor", &caps(&["process", "shout"]));
        let b = synthesize("text_processor", &caps(&["process", "shout"]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_synthesize_emits_procedures_in_discovery_order() {
        let text = synthesize("svc", &caps(&["zeta", "alpha"]));
        let zeta = text.find("rpc zeta(Request) returns (Response);").unwrap();
        let alpha = text.find("rpc alpha(Request) returns (Response);").unwrap();
        assert!(zeta < alpha);
        assert!(text.starts_with("syntax = \"proto3\";\npackage svc;\n"));
        assert!(text.contains("service svcRpc {"));
        assert!(text.contains("message Empty {\n}"));
    }

    #[test]
    fn test_build_compiles_contract() {
        let contract = GeneratedContract::build("text_processor", &caps(&["process"])).unwrap();
        assert_eq!(contract.service, "text_processorRpc");
        assert_eq!(contract.qualified_service(), "text_processor.text_processorRpc");
        assert_eq!(contract.request_type.full_name(), "text_processor.Request");
        assert_eq!(contract.response_type.fields().next().unwrap().name(), "payload");
        assert_eq!(contract.empty_type.fields().len(), 0);
        assert_eq!(
            contract.procedure_path("process").as_deref(),
            Some("/text_processor.text_processorRpc/process")
        );
        assert_eq!(contract.procedure_path("missing"), None);

        let procedure = contract.procedure("process").unwrap();
        assert_eq!(procedure.input(), contract.request_type);
        assert_eq!(procedure.output(), contract.response_type);
    }

    #[test]
    fn test_build_with_zero_capabilities() {
        let contract = GeneratedContract::build("empty_service", &CapabilitySet::new()).unwrap();
        assert!(contract.procedures.is_empty());
        assert_eq!(contract.service_type.methods().len(), 0);
    }

    #[test]
    fn test_invalid_service_name_fails_compilation() {
        let err = GeneratedContract::build("not a name", &caps(&["process"])).unwrap_err();
        assert!(matches!(err, AutoRpcError::ContractCompilation { .. }));

        let err = GeneratedContract::build("bad-name", &caps(&["process"])).unwrap_err();
        assert!(matches!(err, AutoRpcError::ContractCompilation { .. }));
    }

    #[test]
    fn test_invalid_capability_name_fails_compilation() {
        let err = GeneratedContract::build("svc", &caps(&["do-it"])).unwrap_err();
        assert_eq!(err.kind(), "contract_compilation");
    }

    #[test]
    fn test_payload_roundtrip_through_descriptors() {
        let contract = GeneratedContract::build("svc", &caps(&["echo"])).unwrap();
        let request = Request {
            payload: "{\"args\":[1]}".into(),
        };

        let bytes = contract.encode_request("echo", &request).unwrap();
        // Field 1, length-delimited.
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(contract.decode_request("echo", &bytes).unwrap(), request);

        let response = Response {
            payload: "\"1.5\"".into(),
        };
        let bytes = contract.encode_response("echo", &response).unwrap();
        assert_eq!(contract.decode_response("echo", &bytes).unwrap(), response);
    }

    #[test]
    fn test_empty_payload_encodes_to_no_bytes() {
        let contract = GeneratedContract::build("svc", &caps(&["echo"])).unwrap();
        let bytes = contract
            .encode_request("echo", &Request { payload: String::new() })
            .unwrap();
        assert!(bytes.is_empty());
        assert_eq!(contract.decode_request("echo", &bytes).unwrap().payload, "");
    }

    #[test]
    fn test_malformed_message_is_encoding_error() {
        let contract = GeneratedContract::build("svc", &caps(&["echo"])).unwrap();
        let err = contract.decode_request("echo", &[0x0a, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, AutoRpcError::Encoding { .. }));
    }

    #[test]
    fn test_undeclared_procedure_is_unknown() {
        let contract = GeneratedContract::build("svc", &caps(&["echo"])).unwrap();
        let request = Request {
            payload: "{}".into(),
        };
        let err = contract.encode_request("missing", &request).unwrap_err();
        assert!(matches!(err, AutoRpcError::UnknownCapability(_)));
    }

    struct RecordingCompiler {
        seen: Mutex<Option<std::path::PathBuf>>,
    }

    impl ContractCompiler for RecordingCompiler {
        fn compile(&self, path: &Path) -> std::result::Result<DescriptorPool, String> {
            *self.seen.lock().unwrap() = Some(path.to_path_buf());
            ProtoxCompiler.compile(path)
        }
    }

    #[test]
    fn test_transient_file_is_removed_after_compile() {
        let compiler = RecordingCompiler {
            seen: Mutex::new(None),
        };
        GeneratedContract::build_with("svc", &caps(&["a"]), &compiler).unwrap();

        let path = compiler.seen.lock().unwrap().clone().unwrap();
        assert!(path.to_string_lossy().ends_with(".proto"));
        assert!(!path.exists());
    }

    struct BrokenCompiler;

    impl ContractCompiler for BrokenCompiler {
        fn compile(&self, _path: &Path) -> std::result::Result<DescriptorPool, String> {
            Err("compiler exited with status 1".to_string())
        }
    }

    #[test]
    fn test_compiler_failure_is_fatal() {
        let err = GeneratedContract::build_with("svc", &caps(&["a"]), &BrokenCompiler).unwrap_err();
        match err {
            AutoRpcError::ContractCompilation { service, message } => {
                assert_eq!(service, "svc");
                assert!(message.contains("status 1"));
            }
            other => panic!("Expected ContractCompilation, got: {:?}", other),
        }
    }

    /// Compiles a fixed source instead of the synthesized one.
    struct FixedSourceCompiler(&'static str);

    impl ContractCompiler for FixedSourceCompiler {
        fn compile(&self, _path: &Path) -> std::result::Result<DescriptorPool, String> {
            let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
            let path = dir.path().join("fixed.proto");
            std::fs::write(&path, self.0).map_err(|e| e.to_string())?;
            ProtoxCompiler.compile(&path)
        }
    }

    #[test]
    fn test_contract_shape_is_validated() {
        let missing_empty = FixedSourceCompiler(
            "syntax = \"proto3\";\npackage svc;\n\
             message Request { string payload = 1; }\n\
             message Response { string payload = 1; }\n\
             service svcRpc { rpc a(Request) returns (Response); }\n",
        );
        let err = GeneratedContract::build_with("svc", &caps(&["a"]), &missing_empty).unwrap_err();
        assert!(err.to_string().contains("svc.Empty"), "{}", err);

        let wrong_payload = FixedSourceCompiler(
            "syntax = \"proto3\";\npackage svc;\n\
             message Request { bytes payload = 1; }\n\
             message Response { string payload = 1; }\n\
             message Empty {}\n\
             service svcRpc { rpc a(Request) returns (Response); }\n",
        );
        let err = GeneratedContract::build_with("svc", &caps(&["a"]), &wrong_payload).unwrap_err();
        assert!(err.to_string().contains("svc.Request"), "{}", err);

        let extra_procedure = FixedSourceCompiler(
            "syntax = \"proto3\";\npackage svc;\n\
             message Request { string payload = 1; }\n\
             message Response { string payload = 1; }\n\
             message Empty {}\n\
             service svcRpc {\n\
                 rpc a(Request) returns (Response);\n\
                 rpc b(Empty) returns (Response);\n\
             }\n",
        );
        let err =
            GeneratedContract::build_with("svc", &caps(&["a"]), &extra_procedure).unwrap_err();
        assert!(matches!(err, AutoRpcError::ContractCompilation { .. }));
    }

    #[test]
    fn test_compiler_accepts_full_proto3() {
        let compiler = FixedSourceCompiler(
            "syntax = \"proto3\";\n\
             /* block comment */\n\
             package demo;\n\
             option java_package = \"demo\";\n\
             import \"google/protobuf/empty.proto\";\n\
             message Tags {\n\
                 repeated string names = 1;\n\
                 map<string, string> labels = 2;\n\
             }\n\
             service Tagger { rpc clear(google.protobuf.Empty) returns (Tags); }\n",
        );
        let pool = compiler.compile(Path::new("unused.proto")).unwrap();

        let tags = pool.get_message_by_name("demo.Tags").unwrap();
        assert!(tags.get_field_by_name("names").unwrap().is_list());
        assert!(tags.get_field_by_name("labels").unwrap().is_map());
        let tagger = pool.get_service_by_name("demo.Tagger").unwrap();
        assert_eq!(
            tagger.methods().next().unwrap().input().full_name(),
            "google.protobuf.Empty"
        );
    }
}
