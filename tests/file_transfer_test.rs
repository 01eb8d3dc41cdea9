use pipelink::Error;
use pipelink::file_transfer::{
    FileAssembler, FileChunker, MIN_PACKET_SIZE, part_path, payload_capacity, plan_max_part,
};
use pipelink::protocol::{Packet, PacketKind};
use rand::Rng;
use std::path::Path;

const PACKET_SIZE: usize = 128;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill(&mut data[..]);
    data
}

/// Largest file that fits in exactly `max_part` parts
fn full_capacity(max_part: u32, packet_size: usize) -> usize {
    (1..=max_part)
        .map(|part| payload_capacity(part, max_part, packet_size))
        .sum()
}

async fn chunk(name: &str, data: &[u8], packet_size: usize) -> Vec<Packet> {
    FileChunker::new(name, data.len() as u64, data, packet_size)
        .unwrap()
        .collect()
        .await
        .unwrap()
}

async fn reassemble(dir: &Path, packets: &[Packet]) -> Vec<u8> {
    let mut assembler = FileAssembler::new(dir);
    for packet in packets {
        assembler.accept(packet).await.unwrap();
    }
    assert!(assembler.is_complete());
    let path = assembler.finish().await.unwrap();
    tokio::fs::read(path).await.unwrap()
}

async fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

#[tokio::test]
async fn test_ten_thousand_byte_scenario() {
    let data = random_bytes(10_050);
    assert_eq!(plan_max_part(10_050, 4096).unwrap(), 3);

    let packets = chunk("scenario.bin", &data, 4096).await;
    assert_eq!(packets.len(), 4);
    assert!(packets[0].is_file_header());
    assert_eq!(packets[0].payload, b"scenario.bin");

    let rebuilt: Vec<u8> = packets[1..]
        .iter()
        .flat_map(|p| p.payload.iter().copied())
        .collect();
    assert_eq!(rebuilt, data);
    assert!(packets.iter().all(|p| p.encoded_len() <= 4096));
}

#[tokio::test]
async fn test_round_trip_across_digit_boundaries() {
    for max_part in [9u32, 10, 11, 99, 100] {
        for size in [
            full_capacity(max_part, PACKET_SIZE),
            full_capacity(max_part - 1, PACKET_SIZE) + 1,
        ] {
            let dir = tempfile::tempdir().unwrap();
            let data = random_bytes(size);
            let packets = chunk("boundary.dat", &data, PACKET_SIZE).await;

            assert_eq!(packets[0].max_part, max_part, "size {size}");
            assert_eq!(packets.len(), max_part as usize + 1);
            for packet in &packets {
                assert!(
                    packet.encoded_len() <= PACKET_SIZE,
                    "part {} of {} is {} bytes",
                    packet.part,
                    packet.max_part,
                    packet.encoded_len()
                );
                assert_eq!(Packet::decode(&packet.encode()).unwrap(), *packet);
            }

            assert_eq!(reassemble(dir.path(), &packets).await, data);
            assert_eq!(dir_entries(dir.path()).await, vec!["boundary.dat"]);
        }
    }
}

#[tokio::test]
async fn test_parts_reassemble_in_numeric_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut packets = vec![Packet::file_header("ordered.txt", 11)];
    for part in (1..=11u32).rev() {
        let payload = format!("[{part}]");
        packets.push(Packet::new(PacketKind::File, part, 11, payload.into_bytes()));
    }

    let mut assembler = FileAssembler::new(dir.path());
    for packet in &packets {
        assembler.accept(packet).await.unwrap();
    }
    assert!(part_path(dir.path(), "ordered.txt", 10).exists());
    let path = assembler.finish().await.unwrap();

    let text = tokio::fs::read_to_string(path).await.unwrap();
    assert_eq!(text, "[1][2][3][4][5][6][7][8][9][10][11]");
}

#[tokio::test]
async fn test_gap_fails_and_removes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut assembler = FileAssembler::new(dir.path());
    assembler
        .accept(&Packet::file_header("holey.bin", 3))
        .await
        .unwrap();
    assembler
        .accept(&Packet::new(PacketKind::File, 1, 3, b"one".to_vec()))
        .await
        .unwrap();
    assembler
        .accept(&Packet::new(PacketKind::File, 3, 3, b"three".to_vec()))
        .await
        .unwrap();
    assert!(!assembler.is_complete());

    match assembler.finish().await {
        Err(Error::MissingPart {
            file_name,
            part,
            max_part,
        }) => {
            assert_eq!(file_name, "holey.bin");
            assert_eq!(part, 2);
            assert_eq!(max_part, 3);
        }
        other => panic!("expected a missing part error, got {other:?}"),
    }
    assert!(dir_entries(dir.path()).await.is_empty());
}

#[tokio::test]
async fn test_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let packets = chunk("empty", &[], PACKET_SIZE).await;

    assert_eq!(packets.len(), 2);
    assert_eq!(packets[1], Packet::new(PacketKind::File, 1, 1, Vec::new()));
    assert!(reassemble(dir.path(), &packets).await.is_empty());
}

#[tokio::test]
async fn test_existing_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("note.txt"), b"old contents that are longer")
        .await
        .unwrap();

    let packets = chunk("note.txt", b"new", PACKET_SIZE).await;
    assert_eq!(reassemble(dir.path(), &packets).await, b"new");
}

#[tokio::test]
async fn test_chunker_opens_files_by_path() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let data = random_bytes(5_000);
    tokio::fs::write(&source, &data).await.unwrap();

    let chunker = FileChunker::open(&source, 1024).await.unwrap();
    assert_eq!(chunker.file_name(), "source.bin");
    assert_eq!(chunker.file_size(), 5_000);
    let packets = chunker.collect().await.unwrap();

    let out = tempfile::tempdir().unwrap();
    assert_eq!(reassemble(out.path(), &packets).await, data);
}

#[tokio::test]
async fn test_header_must_fit_budget() {
    let name = "n".repeat(100);
    let result = FileChunker::new(name, 10, &b"0123456789"[..], MIN_PACKET_SIZE);
    assert!(matches!(result, Err(Error::PacketTooLarge { .. })));
}

#[tokio::test]
async fn test_peer_supplied_name_cannot_escape_download_dir() {
    let root = tempfile::tempdir().unwrap();
    let downloads = root.path().join("downloads");
    tokio::fs::create_dir(&downloads).await.unwrap();

    let packets = vec![
        Packet::file_header("../escape.txt", 1),
        Packet::new(PacketKind::File, 1, 1, b"x".to_vec()),
    ];
    reassemble(&downloads, &packets).await;

    assert!(downloads.join("escape.txt").exists());
    assert!(!root.path().join("escape.txt").exists());
}
