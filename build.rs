fn main() {
    // Only run gRPC codegen when the "grpc" feature is enabled.
    // Cargo sets CARGO_FEATURE_GRPC when compiling with --features grpc.
    if std::env::var("CARGO_FEATURE_GRPC").is_ok() {
        let admin = tonic_build::manual::Service::builder()
            .name("Admin")
            .package("relay")
            .method(
                tonic_build::manual::Method::builder()
                    .name("logging")
                    .route_name("Logging")
                    .input_type("crate::microsvc::grpc::Nothing")
                    .output_type("crate::microsvc::grpc::EventMessage")
                    .codec_path("tonic::codec::ProstCodec")
                    .server_streaming()
                    .build(),
            )
            .method(
                tonic_build::manual::Method::builder()
                    .name("statistics")
                    .route_name("Statistics")
                    .input_type("crate::microsvc::grpc::StatInterval")
                    .output_type("crate::microsvc::grpc::StatMessage")
                    .codec_path("tonic::codec::ProstCodec")
                    .server_streaming()
                    .build(),
            )
            .build();

        let biz = ["check", "add", "test"]
            .iter()
            .fold(
                tonic_build::manual::Service::builder()
                    .name("Biz")
                    .package("relay"),
                |service, name| {
                    let mut route = name.to_string();
                    route[..1].make_ascii_uppercase();
                    service.method(
                        tonic_build::manual::Method::builder()
                            .name(*name)
                            .route_name(route)
                            .input_type("crate::microsvc::grpc::Nothing")
                            .output_type("crate::microsvc::grpc::Nothing")
                            .codec_path("tonic::codec::ProstCodec")
                            .build(),
                    )
                },
            )
            .build();

        tonic_build::manual::Builder::new().compile(&[admin, biz]);
    }
}
