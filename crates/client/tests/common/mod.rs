use httpmock::MockServer;
use photosync_client::HttpRemoteStore;
use photosync_core::{ContentDigest, ObjectKey};
use std::net::TcpListener;
use std::time::Duration;

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

pub fn client_for(server: &MockServer) -> HttpRemoteStore {
    HttpRemoteStore::new(&server.base_url(), Duration::from_secs(5)).unwrap()
}

pub fn key_for(bytes: &[u8]) -> ObjectKey {
    ObjectKey::for_digest(&ContentDigest::compute(bytes), "jpg")
}
