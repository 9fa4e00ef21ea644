//! Store-level tests over an in-memory database.

use chrono::Utc;
use keybus_core::{CellIndex, ControllerAddress, KeyCode, StorageConfig};
use keybus_storage::{
    FloorRepository, KeyAssignment, KeyRepository, NewRoom, RoomRepository, Store,
};

fn addr(n: u8) -> ControllerAddress {
    ControllerAddress::new(n).unwrap()
}

#[tokio::test]
async fn load_floor_returns_none_for_unknown_port() {
    let store = Store::in_memory().await.unwrap();
    assert!(store.load_floor("COM9", 12).await.unwrap().is_none());
}

#[tokio::test]
async fn load_floor_collects_rooms_and_cells() {
    let store = Store::in_memory().await.unwrap();
    let floor = store.floors().create("COM3", "First").await.unwrap();
    let a = store
        .add_room(&NewRoom::new(floor.id, 101, addr(1)).protected(true), 12)
        .await
        .unwrap();
    store
        .add_room(&NewRoom::new(floor.id, 102, addr(2)), 12)
        .await
        .unwrap();

    let code = KeyCode::new([5, 4, 3, 2, 1]);
    let cell = CellIndex::new(7, 12).unwrap();
    store
        .keys()
        .assign(a.id, &KeyAssignment::new(cell, code, "guest"))
        .await
        .unwrap();

    let snapshot = store.load_floor("COM3", 12).await.unwrap().unwrap();
    assert_eq!(snapshot.floor, floor);
    assert_eq!(snapshot.rooms.len(), 2);
    assert!(snapshot.rooms[0].room.protected);
    assert_eq!(snapshot.rooms[0].keys.len(), 12);
    assert_eq!(snapshot.rooms[0].keys[7].code().unwrap(), Some(code));
    assert!(snapshot.rooms[1].keys.iter().all(|k| k.key_code.is_none()));
}

#[tokio::test]
async fn load_floor_fills_cells_for_rooms_inserted_without_them() {
    let store = Store::in_memory().await.unwrap();
    let floor = store.floors().create("COM3", "First").await.unwrap();
    let room = store
        .rooms()
        .create(&NewRoom::new(floor.id, 101, addr(1)))
        .await
        .unwrap();
    assert!(store.keys().find_by_room(room.id).await.unwrap().is_empty());

    let snapshot = store.load_floor("COM3", 12).await.unwrap().unwrap();
    assert_eq!(snapshot.rooms[0].keys.len(), 12);
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("keybus.db").to_string_lossy().into_owned(),
        max_connections: 2,
    };

    {
        let store = Store::open(&config).await.unwrap();
        let floor = store.floors().create("COM3", "First").await.unwrap();
        let room = store
            .add_room(&NewRoom::new(floor.id, 101, addr(1)), 12)
            .await
            .unwrap();
        store
            .keys()
            .clear(room.id, CellIndex::new(0, 12).unwrap(), Utc::now())
            .await
            .unwrap();
        store.database().close().await;
    }

    let store = Store::open(&config).await.unwrap();
    let snapshot = store.load_floor("COM3", 12).await.unwrap().unwrap();
    assert_eq!(snapshot.rooms.len(), 1);
    assert!(snapshot.rooms[0].keys[0].removed_at.is_some());
}
