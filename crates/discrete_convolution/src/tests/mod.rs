// unit tests

use super::*;

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use ndarray::array;
use rand::{Rng, SeedableRng, rngs::StdRng};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// test helper functions

fn random_image(rng: &mut StdRng, width: usize, height: usize) -> Image {
    let pixels: Vec<u8> = (0..width * height * CHANNELS).map(|_| rng.random()).collect();
    Image::new(width, height, pixels).unwrap()
}

fn random_kernel(rng: &mut StdRng, width: usize, height: usize) -> Kernel {
    let coefficients: Vec<f64> = (0..width * height)
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Kernel::new(width, height, coefficients).unwrap()
}

/// A spread of image and kernel shapes, including even kernels and kernels
/// larger than the image.
fn test_cases() -> Vec<(Image, Kernel)> {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    let shapes = [
        ((1, 1), (3, 3)),
        ((7, 5), (3, 3)),
        ((16, 9), (5, 5)),
        ((13, 11), (2, 4)),
        ((4, 17), (6, 1)),
        ((3, 2), (7, 7)),
        ((31, 23), (1, 1)),
    ];

    shapes
        .into_iter()
        .map(|((w, h), (kw, kh))| (random_image(&mut rng, w, h), random_kernel(&mut rng, kw, kh)))
        .collect()
}

#[test]
fn image_rejects_wrong_buffer_length() {
    assert!(matches!(
        Image::new(2, 2, vec![0; 11]),
        Err(ConvolutionError::InvalidImage { len: 11, .. })
    ));
    assert!(matches!(
        Image::new(0, 2, vec![]),
        Err(ConvolutionError::InvalidImage { .. })
    ));
}

#[test]
fn image_indexing_is_row_column_channel() {
    let mut pixels = vec![0; 3 * 2 * CHANNELS];
    pixels[(3 + 2) * CHANNELS + 1] = 42;
    let image = Image::new(3, 2, pixels).unwrap();

    assert_eq!(image[(1, 2, 1)], 42);
    assert_eq!(image[(1, 2, 0)], 0);
    assert_eq!(image.pixel(2, 1), [0, 42, 0]);
}

#[test]
fn kernel_validation_checks_coefficient_count() {
    assert!(Kernel::new(3, 3, vec![0.0; 9]).is_ok());
    assert!(matches!(
        Kernel::new(3, 3, vec![0.0; 8]),
        Err(ConvolutionError::InvalidKernel {
            width: 3,
            height: 3,
            len: 8
        })
    ));
    assert!(matches!(
        Kernel::new(0, 0, vec![]),
        Err(ConvolutionError::InvalidKernel { .. })
    ));
}

#[test]
fn kernel_half_extents_floor() {
    let kernel = Kernel::box_blur(4);
    let geometry = kernel.validate().unwrap();
    assert_eq!((geometry.half_width, geometry.half_height), (2, 2));

    let kernel = Kernel::new(3, 1, vec![1.0; 3]).unwrap();
    let geometry = kernel.validate().unwrap();
    assert_eq!((geometry.half_width, geometry.half_height), (1, 0));
}

#[test]
fn kernel_from_array_is_row_major() {
    let kernel: Kernel = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into();
    assert_eq!(kernel.width, 3);
    assert_eq!(kernel.height, 2);
    assert_eq!(kernel.coefficients, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    // a transposed view still yields logical row-major order
    let kernel: Kernel = array![[1.0, 2.0], [3.0, 4.0]].reversed_axes().into();
    assert_eq!(kernel.coefficients, vec![1.0, 3.0, 2.0, 4.0]);
}

#[test]
fn default_kernel_is_uniform_3x3() {
    let kernel = Kernel::default();
    assert_eq!((kernel.width, kernel.height), (3, 3));
    assert!(kernel.coefficients.iter().all(|&c| c == 1.0 / 9.0));
}

#[test]
fn gaussian_kernel_is_normalized() {
    let kernel = Kernel::gaussian(5, 1.0);
    let sum: f64 = kernel.coefficients.iter().sum();
    assert!((sum - 1.0).abs() < 1e-12);

    // peak at the centre tap
    let center = kernel.coefficients[2 * 5 + 2];
    assert!(kernel.coefficients.iter().all(|&c| c <= center));
}

#[test]
fn saturate_rounds_half_away_from_zero_and_clamps() {
    assert_eq!(convolve::saturate(2.5), 3);
    assert_eq!(convolve::saturate(2.4999), 2);
    assert_eq!(convolve::saturate(-0.5), 0);
    assert_eq!(convolve::saturate(254.5), 255);
    assert_eq!(convolve::saturate(300.0), 255);
    assert_eq!(convolve::saturate(-10.0), 0);
}

#[test]
fn identity_kernel_leaves_image_unchanged() {
    let mut rng = StdRng::seed_from_u64(1);
    let image = random_image(&mut rng, 9, 6);

    let output = convolve_sequential(&image, &Kernel::identity()).unwrap();
    assert_eq!(output, image);
}

#[test]
fn zero_kernel_produces_black_image() {
    let mut rng = StdRng::seed_from_u64(2);
    let image = random_image(&mut rng, 5, 8);

    for (kw, kh) in [(1, 1), (3, 3), (4, 2)] {
        let kernel = Kernel::new(kw, kh, vec![0.0; kw * kh]).unwrap();
        let output = convolve_sequential(&image, &kernel).unwrap();

        assert_eq!((output.width(), output.height()), (5, 8));
        assert!(output.pixels().iter().all(|&v| v == 0));
    }
}

#[test]
fn single_pixel_with_centre_tap_is_unchanged() {
    let image = Image::new(1, 1, vec![10, 128, 250]).unwrap();
    let mut coefficients = vec![0.0; 9];
    coefficients[4] = 1.0;
    let kernel = Kernel::new(3, 3, coefficients).unwrap();

    for output in [
        convolve_sequential(&image, &kernel).unwrap(),
        convolve_parallel(&image, &kernel).unwrap(),
        run_local_world(&image, &kernel, 2, 2).unwrap(),
    ] {
        assert_eq!(output, image);
    }
}

#[test]
fn border_taps_read_as_zero() {
    // 3x1 image, uniform 3x1 sum: the edge pixels only see two taps
    let image = Image::new(3, 1, vec![30, 30, 30, 60, 60, 60, 90, 90, 90]).unwrap();
    let kernel = Kernel::new(3, 1, vec![1.0; 3]).unwrap();

    let output = convolve_sequential(&image, &kernel).unwrap();
    assert_eq!(output.pixel(0, 0), [90; 3]);
    assert_eq!(output.pixel(1, 0), [180; 3]);
    assert_eq!(output.pixel(2, 0), [150; 3]);
}

#[test]
fn even_kernels_reach_further_right_and_down() {
    // a 2x2 kernel with only its (1, 1) tap set reads the pixel at (x, y);
    // its (0, 0) tap reads (x - 1, y - 1)
    let mut rng = StdRng::seed_from_u64(3);
    let image = random_image(&mut rng, 4, 4);

    let centre = Kernel::new(2, 2, vec![0.0, 0.0, 0.0, 1.0]).unwrap();
    assert_eq!(convolve_sequential(&image, &centre).unwrap(), image);

    let up_left = Kernel::new(2, 2, vec![1.0, 0.0, 0.0, 0.0]).unwrap();
    let output = convolve_sequential(&image, &up_left).unwrap();
    assert_eq!(output.pixel(0, 0), [0; 3]);
    assert_eq!(output.pixel(3, 2), image.pixel(2, 1));
}

#[test]
fn accumulations_outside_channel_range_are_clamped() {
    let image = Image::new(1, 1, vec![100, 10, 5]).unwrap();

    let output = convolve_sequential(&image, &Kernel::new(1, 1, vec![3.0]).unwrap()).unwrap();
    assert_eq!(output.pixel(0, 0), [255, 30, 15]);

    let output = convolve_sequential(&image, &Kernel::new(1, 1, vec![-1.0]).unwrap()).unwrap();
    assert_eq!(output.pixel(0, 0), [0, 0, 0]);
}

#[test]
fn averaging_kernel_matches_hand_computation() {
    let image = Image::new(
        3,
        3,
        (1..=9u8).flat_map(|v| [v * 10, v, 0]).collect(),
    )
    .unwrap();

    let output = convolve_sequential(&image, &Kernel::default()).unwrap();

    // centre sees all nine pixels: (10 + ... + 90) / 9 = 50, (1 + ... + 9) / 9 = 5
    assert_eq!(output.pixel(1, 1), [50, 5, 0]);
    // corner sees pixels 1, 2, 4, 5: 120 / 9 = 13.33, 12 / 9 = 1.33
    assert_eq!(output.pixel(0, 0), [13, 1, 0]);
}

#[test]
fn parallel_matches_sequential() {
    for (image, kernel) in test_cases() {
        let expected = convolve_sequential(&image, &kernel).unwrap();

        assert_eq!(convolve_parallel(&image, &kernel).unwrap(), expected);
        for threads in [1, 2, 3, 8, 64] {
            assert_eq!(
                convolve_parallel_with_threads(&image, &kernel, threads).unwrap(),
                expected
            );
        }
    }
}

#[test]
fn parallel_splits_short_wide_images_within_rows() {
    let mut rng = StdRng::seed_from_u64(6);
    let kernel = random_kernel(&mut rng, 3, 3);

    // chunk boundaries fall part way through a row
    for (width, height) in [(97, 1), (37, 2), (1, 1)] {
        let image = random_image(&mut rng, width, height);
        let expected = convolve_sequential(&image, &kernel).unwrap();

        for threads in [3, 8] {
            assert_eq!(
                convolve_parallel_with_threads(&image, &kernel, threads).unwrap(),
                expected,
                "{width}x{height} on {threads} threads"
            );
        }
    }
}

#[test]
fn parallel_rejects_zero_threads() {
    let image = Image::filled(2, 2, 1).unwrap();
    assert!(matches!(
        convolve_parallel_with_threads(&image, &Kernel::default(), 0),
        Err(ConvolutionError::InvalidThreadCount(0))
    ));
}

#[test]
fn row_blocks_cover_every_row_once() {
    for height in [1, 2, 5, 7, 16, 100, 101] {
        for world_size in 1..=12 {
            let blocks: Vec<_> = (0..world_size)
                .map(|rank| row_block(height, rank, world_size).unwrap())
                .collect();

            assert_eq!(blocks[0].start, 0);
            assert_eq!(blocks[world_size - 1].end, height);
            for pair in blocks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }

            let rows_per_process = height / world_size;
            assert_eq!(
                blocks[world_size - 1].len(),
                rows_per_process + height % world_size
            );
            for block in &blocks[..world_size - 1] {
                assert_eq!(block.len(), rows_per_process);
            }
        }
    }
}

#[test]
fn row_block_rejects_bad_rank() {
    assert!(matches!(
        row_block(10, 3, 3),
        Err(ConvolutionError::InvalidTopology {
            rank: 3,
            world_size: 3
        })
    ));
    assert!(row_block(10, 0, 0).is_err());
}

#[test]
fn distributed_matches_sequential() {
    for (image, kernel) in test_cases() {
        let expected = convolve_sequential(&image, &kernel).unwrap();

        for world_size in [1, 2, 3, 5] {
            let output = run_local_world(&image, &kernel, world_size, 2).unwrap();
            assert_eq!(output, expected, "world size {world_size}");
        }
    }
}

#[test]
fn distributed_with_more_ranks_than_rows() {
    let mut rng = StdRng::seed_from_u64(4);
    let image = random_image(&mut rng, 6, 3);
    let kernel = random_kernel(&mut rng, 3, 3);

    let expected = convolve_sequential(&image, &kernel).unwrap();
    assert_eq!(run_local_world(&image, &kernel, 7, 1).unwrap(), expected);
}

#[test]
fn distributed_single_row_blocks_match_sequential() {
    let mut rng = StdRng::seed_from_u64(7);
    let image = random_image(&mut rng, 41, 7);
    let kernel = random_kernel(&mut rng, 5, 3);

    let expected = convolve_sequential(&image, &kernel).unwrap();
    assert_eq!(run_local_world(&image, &kernel, 5, 8).unwrap(), expected);
}

#[test]
fn distributed_over_tcp_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(5);
    let image = random_image(&mut rng, 19, 14);
    let kernel = random_kernel(&mut rng, 3, 5);
    let expected = convolve_sequential(&image, &kernel).unwrap();

    const WORLD_SIZE: usize = 4;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();

    let output = thread::scope(|scope| {
        for rank in 1..WORLD_SIZE {
            let (image, kernel) = (&image, &kernel);
            scope.spawn(move || {
                let mut communicator =
                    TcpCommunicator::worker(address, rank, WORLD_SIZE, CONNECT_TIMEOUT).unwrap();
                convolve_distributed_with_threads(image, kernel, &mut communicator, 2).unwrap();
            });
        }

        let mut communicator =
            TcpCommunicator::coordinator(listener, WORLD_SIZE, CONNECT_TIMEOUT).unwrap();
        convolve_distributed_with_threads(&image, &kernel, &mut communicator, 2).unwrap()
    });

    assert_eq!(output, expected);
}

#[test]
fn every_strategy_rejects_invalid_kernel() {
    let image = Image::filled(4, 4, 7).unwrap();
    let kernel = Kernel {
        width: 3,
        height: 3,
        coefficients: vec![1.0; 8],
    };

    let is_invalid_kernel =
        |result: Result<Image>| matches!(result, Err(ConvolutionError::InvalidKernel { .. }));

    assert!(is_invalid_kernel(convolve_sequential(&image, &kernel)));
    assert!(is_invalid_kernel(convolve_parallel(&image, &kernel)));
    assert!(is_invalid_kernel(run_local_world(&image, &kernel, 3, 1)));

    // rejected before any message is exchanged
    let mut world = LocalCommunicator::world(2).unwrap();
    assert!(is_invalid_kernel(convolve_distributed(
        &image,
        &kernel,
        &mut world[1]
    )));
    assert!(is_invalid_kernel(convolve_distributed(
        &image,
        &kernel,
        &mut world[0]
    )));
}

#[test]
fn local_world_rejects_wrong_message_size() {
    let mut world = LocalCommunicator::world(2).unwrap();
    world[1].send(COORDINATOR, &[1, 2, 3, 4, 5]).unwrap();

    let mut buf = [0u8; 6];
    assert!(matches!(
        world[0].recv(1, &mut buf),
        Err(ConvolutionError::TransportFailure(_))
    ));
}

#[test]
fn local_world_reorders_by_source() {
    let mut world = LocalCommunicator::world(3).unwrap();
    world[2].send(COORDINATOR, &[2, 2]).unwrap();
    world[1].send(COORDINATOR, &[1]).unwrap();

    let mut from_one = [0u8; 1];
    let mut from_two = [0u8; 2];
    world[0].recv(1, &mut from_one).unwrap();
    world[0].recv(2, &mut from_two).unwrap();

    assert_eq!(from_one, [1]);
    assert_eq!(from_two, [2, 2]);
}

#[test]
fn local_world_reports_missing_sender() {
    let mut world = LocalCommunicator::world(2).unwrap();
    let mut coordinator = world.remove(0);
    drop(world);

    let mut buf = [0u8; 3];
    assert!(matches!(
        coordinator.recv(1, &mut buf),
        Err(ConvolutionError::TransportFailure(_))
    ));
}

#[test]
fn tcp_coordinator_rejects_mistagged_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();

    let impostor = thread::spawn(move || {
        let mut stream = TcpStream::connect(address).unwrap();
        // hello as rank 1, then a 3 byte frame claiming to be from rank 2
        let mut frames = Vec::new();
        frames.extend_from_slice(&1u32.to_le_bytes());
        frames.extend_from_slice(&0u64.to_le_bytes());
        frames.extend_from_slice(&2u32.to_le_bytes());
        frames.extend_from_slice(&3u64.to_le_bytes());
        frames.extend_from_slice(&[9, 9, 9]);
        stream.write_all(&frames).unwrap();
        stream
    });

    let mut coordinator = TcpCommunicator::coordinator(listener, 2, CONNECT_TIMEOUT).unwrap();
    let mut buf = [0u8; 3];
    let result = coordinator.recv(1, &mut buf);
    drop(impostor.join().unwrap());

    assert!(matches!(result, Err(ConvolutionError::TransportFailure(_))));
}

#[test]
fn tcp_worker_rejects_coordinator_rank() {
    let address = "127.0.0.1:9".parse().unwrap();
    assert!(matches!(
        TcpCommunicator::worker(address, 0, 2, CONNECT_TIMEOUT),
        Err(ConvolutionError::InvalidTopology { .. })
    ));
}

#[test]
fn tcp_coordinator_gives_up_on_silent_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();

    // connects but never says hello
    let _silent = TcpStream::connect(address).unwrap();

    let timeout = Duration::from_millis(300);
    let started = std::time::Instant::now();
    let result = TcpCommunicator::coordinator(listener, 2, timeout);

    assert!(matches!(result, Err(ConvolutionError::TransportFailure(_))));
    assert!(started.elapsed() < Duration::from_secs(5));
}
