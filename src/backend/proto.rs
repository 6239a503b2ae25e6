//! NEST wire messages and streaming client.
//!
//! The NEST schema is small enough that the messages are written out by hand
//! in prost derive form, mirroring the service's published proto: a
//! `recognize` bidirectional stream whose requests are either a CONFIG
//! payload (JSON option string) or a DATA payload (PCM chunk plus a JSON
//! `extra_contents` sidecar), and whose responses carry a JSON `contents`
//! string.

/// CONFIG request payload: recognition options as a JSON string.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NestConfig {
    #[prost(string, tag = "1")]
    pub config: String,
}

/// DATA request payload: one audio chunk.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NestData {
    #[prost(bytes = "vec", tag = "1")]
    pub chunk: Vec<u8>,
    /// JSON sidecar; carries `epFlag` (end of audio) and `seqId`
    #[prost(string, tag = "2")]
    pub extra_contents: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RequestType {
    Config = 0,
    Data = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NestRequest {
    #[prost(enumeration = "RequestType", tag = "1")]
    pub r#type: i32,
    #[prost(oneof = "nest_request::Part", tags = "2, 3")]
    pub part: Option<nest_request::Part>,
}

pub mod nest_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Part {
        #[prost(message, tag = "2")]
        Config(super::NestConfig),
        #[prost(message, tag = "3")]
        Data(super::NestData),
    }
}

/// Response: recognition payload as a JSON string.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NestResponse {
    #[prost(string, tag = "1")]
    pub contents: String,
}

impl NestRequest {
    pub fn config(config_json: String) -> Self {
        Self {
            r#type: RequestType::Config as i32,
            part: Some(nest_request::Part::Config(NestConfig {
                config: config_json,
            })),
        }
    }

    pub fn data(chunk: Vec<u8>, extra_contents: String) -> Self {
        Self {
            r#type: RequestType::Data as i32,
            part: Some(nest_request::Part::Data(NestData {
                chunk,
                extra_contents,
            })),
        }
    }
}

pub mod nest_service_client {
    use tonic::codegen::http::uri::PathAndQuery;
    use tonic::codegen::*;

    /// Client for the NEST `recognize` bidirectional streaming RPC.
    #[derive(Debug, Clone)]
    pub struct NestServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl NestServiceClient<tonic::transport::Channel> {
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> NestServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub async fn recognize(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::NestRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::NestResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = PathAndQuery::from_static(
                "/com.nbp.cdncp.nest.grpc.proto.v1.NestService/recognize",
            );
            let mut req = request.into_streaming_request();
            req.extensions_mut().insert(GrpcMethod::new(
                "com.nbp.cdncp.nest.grpc.proto.v1.NestService",
                "recognize",
            ));
            self.inner.streaming(req, path, codec).await
        }
    }
}
