use bugreport::{
    bugreport,
    collector::{CompileTimeInformation, EnvironmentVariables, OperatingSystem, SoftwareVersion},
    format::Markdown,
};

pub fn run() {
    bugreport!()
        .info(SoftwareVersion::default())
        .info(OperatingSystem::default())
        .info(EnvironmentVariables::list(&[
            "SHELL",
            "TERM",
            "RUST_LOG",
            "CLOUDLET_OBJECT_STORE",
            "CLOUDLET_DATA_DIR",
            "CLOUDLET_PORT",
            "CLOUDLET_PUBLIC_URL",
            "CLOUDLET_LIST_SCOPE",
        ]))
        .info(CompileTimeInformation::default())
        .print::<Markdown>();
}
