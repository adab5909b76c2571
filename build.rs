//! Build script for compile-time provisioning.
//!
//! Set environment variables before building to bake the device identity (and
//! optionally an initial Wi-Fi network) into the image:
//!
//!   BEACON_DEVICE_ID=lobby-01 \
//!   BEACON_ENDPOINT_URL=http://192.168.1.68:8080 \
//!   BEACON_ENDPOINT_SECRET=mysecret \
//!   BEACON_SSID=MyWiFi \
//!   BEACON_PASSWORD=secret123 \
//!   cargo build --release
//!
//! Or use the build.sh wrapper script. Values saved to flash at runtime take
//! priority over anything baked in here.

fn main() {
    // Re-run build script if these environment variables change
    println!("cargo::rerun-if-env-changed=BEACON_DEVICE_ID");
    println!("cargo::rerun-if-env-changed=BEACON_ENDPOINT_URL");
    println!("cargo::rerun-if-env-changed=BEACON_ENDPOINT_SECRET");
    println!("cargo::rerun-if-env-changed=BEACON_SSID");
    println!("cargo::rerun-if-env-changed=BEACON_PASSWORD");
}
