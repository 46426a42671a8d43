mod common;

use common::{
    pixel_centre, GeoTiffBuilder, NLCD_ALBERS_DOUBLES, NLCD_ALBERS_KEYS, ORIGIN_X, ORIGIN_Y, PIXEL,
};
use exposure_core::error::{ExposureError, ExposureResult};
use exposure_core::{MapPoint, PixelIndex, RasterCrs, TileIndex};
use exposure_provider::{open_raster, FileSource, GeoTiffRaster, Prefetcher, RasterSource, SourceOptions};
use std::io::Write;
use std::sync::Arc;

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn class_at(row: u32, col: u32) -> u8 {
    match (row / 10, col / 10) {
        (0, _) => 11,
        (_, 0) => 41,
        _ => 82,
    }
}

#[tokio::test]
async fn tiled_deflate_raster_reads_expected_pixels() {
    let tiff = GeoTiffBuilder::new(40, 30, class_at)
        .tiled(16, 16)
        .deflate()
        .nodata(250)
        .build();
    let file = write_temp(&tiff);

    let raster = open_raster(file.path().to_str().unwrap(), &SourceOptions::default())
        .await
        .unwrap();
    let md = *raster.metadata();
    assert_eq!((md.width(), md.height()), (40, 30));
    assert_eq!((md.layout.tile_width, md.layout.tile_height), (16, 16));
    assert_eq!(md.nodata, Some(250));
    assert_eq!(md.crs, RasterCrs::Epsg { code: 5070 });

    let (x, y) = pixel_centre(25, 35);
    let pixel = md.pixel_at(MapPoint::new(x, y)).unwrap();
    assert_eq!(pixel, PixelIndex { row: 25, col: 35 });

    let tiles = Prefetcher::new(raster.clone())
        .prefetch([pixel, PixelIndex { row: 2, col: 2 }, PixelIndex { row: 20, col: 5 }])
        .await
        .unwrap();
    assert_eq!(tiles.pixel(pixel), Some(82));
    assert_eq!(tiles.pixel(PixelIndex { row: 2, col: 2 }), Some(11));
    assert_eq!(tiles.pixel(PixelIndex { row: 20, col: 5 }), Some(41));

    // Padding of the bottom-right tile holds the fill value.
    let edge = raster.read_tile(TileIndex { row: 1, col: 2 }).await.unwrap();
    assert_eq!(edge.get(15, 15), Some(250));
}

#[tokio::test]
async fn stripped_raster_with_short_last_strip() {
    let tiff = GeoTiffBuilder::new(12, 7, |r, c| (r * 12 + c) as u8)
        .strips(3)
        .build();
    let file = write_temp(&tiff);

    let source = FileSource::open(file.path()).await.unwrap();
    let raster = GeoTiffRaster::open(source, &SourceOptions::default())
        .await
        .unwrap();
    let layout = raster.metadata().layout;
    assert_eq!(layout.tile_width, 12);
    assert_eq!(layout.tile_height, 3);
    assert_eq!(layout.tiles_down(), 3);

    let last = raster.read_tile(TileIndex { row: 2, col: 0 }).await.unwrap();
    assert_eq!(last.height, 1);
    assert_eq!(last.get(0, 5), Some(6 * 12 + 5));
}

#[tokio::test]
async fn repeated_reads_are_served_from_cache() {
    let tiff = GeoTiffBuilder::new(32, 32, |_, _| 21).tiled(16, 16).build();
    let file = write_temp(&tiff);
    let source = FileSource::open(file.path()).await.unwrap();
    let raster = Arc::new(
        GeoTiffRaster::open(source, &SourceOptions::default())
            .await
            .unwrap(),
    );

    let a = raster.read_tile(TileIndex { row: 1, col: 1 }).await.unwrap();
    let b = raster.read_tile(TileIndex { row: 1, col: 1 }).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

async fn open_bytes(tiff: &[u8]) -> ExposureResult<Arc<dyn RasterSource>> {
    // Tiles are read lazily by path, so the file must outlive this helper.
    let path = write_temp(tiff).into_temp_path().keep().unwrap();
    open_raster(path.to_str().unwrap(), &SourceOptions::default()).await
}

async fn open_err(tiff: &[u8]) -> ExposureError {
    match open_bytes(tiff).await {
        Ok(raster) => panic!("opened with {:?}", raster.metadata().crs),
        Err(err) => err,
    }
}

/// Every pixel of the raster matches `class_at`.
async fn assert_pixels(raster: &Arc<dyn RasterSource>) {
    let md = *raster.metadata();
    let all = (0..md.height())
        .flat_map(|row| (0..md.width()).map(move |col| PixelIndex { row, col }));
    let tiles = Prefetcher::new(raster.clone()).prefetch(all).await.unwrap();
    for row in 0..md.height() {
        for col in 0..md.width() {
            let expected = u16::from(class_at(row, col));
            assert_eq!(tiles.pixel(PixelIndex { row, col }), Some(expected), "({row}, {col})");
        }
    }
}

#[tokio::test]
async fn user_defined_albers_parameters_are_read_from_double_params() {
    let mut doubles = NLCD_ALBERS_DOUBLES.to_vec();
    doubles[3] = -90.0;
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11)
        .geokeys(NLCD_ALBERS_KEYS.to_vec())
        .geo_doubles(doubles)
        .build();
    let raster = open_bytes(&tiff).await.unwrap();

    let RasterCrs::Albers(params) = raster.metadata().crs else {
        panic!("expected Albers, got {:?}", raster.metadata().crs);
    };
    assert_eq!((params.lat1, params.lat2), (29.5, 45.5));
    assert_eq!((params.lat0, params.lon0), (23.0, -90.0));
    assert_eq!((params.false_easting, params.false_northing), (0.0, 0.0));
}

#[tokio::test]
async fn user_defined_albers_without_parameters_is_rejected() {
    let keys = vec![1, 1, 0, 2, 3072, 0, 1, 32767, 3075, 0, 1, 11];
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11).geokeys(keys).build();
    let err = open_err(&tiff).await;
    assert!(matches!(err, ExposureError::Format(_)), "{err:?}");
    assert!(err.to_string().contains("ProjStdParallel1"), "{err}");
}

#[tokio::test]
async fn user_defined_non_albers_projection_is_rejected() {
    // Lambert conformal conic (2SP) is coordinate transformation 8.
    let keys = vec![1, 1, 0, 3, 1024, 0, 1, 1, 3072, 0, 1, 32767, 3075, 0, 1, 8];
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11).geokeys(keys).build();
    let err = open_err(&tiff).await;
    assert!(matches!(err, ExposureError::Format(_)), "{err:?}");
    assert!(err.to_string().contains("coordinate transformation 8"), "{err}");
}

#[tokio::test]
async fn geographic_raster_is_rejected_at_open() {
    // GTModelType geographic, PixelIsArea, GeographicType WGS84.
    let keys = vec![1, 1, 0, 3, 1024, 0, 1, 2, 1025, 0, 1, 1, 2048, 0, 1, 4326];
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11).geokeys(keys).build();
    let err = open_err(&tiff).await;
    assert!(matches!(err, ExposureError::Format(_)), "{err:?}");
    assert!(err.to_string().contains("EPSG:4326"), "{err}");
}

#[tokio::test]
async fn unsupported_projected_epsg_is_rejected_at_open() {
    let keys = vec![1, 1, 0, 2, 1024, 0, 1, 1, 3072, 0, 1, 32614];
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11).geokeys(keys).build();
    let err = open_err(&tiff).await;
    assert!(err.to_string().contains("EPSG:32614"), "{err}");
}

#[tokio::test]
async fn raster_without_crs_keys_defaults_to_conus_albers() {
    let keys = vec![1, 1, 0, 1, 1025, 0, 1, 1];
    let tiff = GeoTiffBuilder::new(8, 8, |_, _| 11).geokeys(keys).build();
    let raster = open_bytes(&tiff).await.unwrap();
    assert_eq!(raster.metadata().crs, RasterCrs::Unspecified);
    assert!(raster.metadata().crs.projection().is_ok());
}

#[tokio::test]
async fn model_transformation_georeferences_like_tiepoint() {
    let tiff = GeoTiffBuilder::new(20, 20, class_at).transformation().build();
    let raster = open_bytes(&tiff).await.unwrap();
    let md = raster.metadata();
    assert_eq!(
        md.transform.coefficients(),
        [ORIGIN_X, PIXEL, 0.0, ORIGIN_Y, 0.0, -PIXEL]
    );
    let (x, y) = pixel_centre(13, 4);
    assert_eq!(
        md.pixel_at(MapPoint::new(x, y)),
        Some(PixelIndex { row: 13, col: 4 })
    );
}

#[tokio::test]
async fn pixel_is_point_shifts_origin_half_a_pixel() {
    let keys = vec![1, 1, 0, 2, 1025, 0, 1, 2, 3072, 0, 1, 5070];
    let tiff = GeoTiffBuilder::new(20, 20, class_at).geokeys(keys).build();
    let raster = open_bytes(&tiff).await.unwrap();
    let md = raster.metadata();
    assert_eq!(
        md.transform.coefficients(),
        [ORIGIN_X - PIXEL / 2.0, PIXEL, 0.0, ORIGIN_Y + PIXEL / 2.0, 0.0, -PIXEL]
    );
    // The tiepoint now names the centre of pixel (0, 0).
    assert_eq!(
        md.pixel_at(MapPoint::new(ORIGIN_X + 3.0 * PIXEL, ORIGIN_Y - 7.0 * PIXEL)),
        Some(PixelIndex { row: 7, col: 3 })
    );
}

#[tokio::test]
async fn big_endian_classic_tiff_reads_expected_pixels() {
    let tiff = GeoTiffBuilder::new(40, 30, class_at)
        .tiled(16, 16)
        .deflate()
        .big_endian()
        .build();
    assert_eq!(&tiff[..2], b"MM");
    let raster = open_bytes(&tiff).await.unwrap();
    assert_eq!(raster.metadata().crs, RasterCrs::Epsg { code: 5070 });
    assert_pixels(&raster).await;
}

#[tokio::test]
async fn bigtiff_reads_expected_pixels_in_both_byte_orders() {
    for big_endian in [false, true] {
        let mut builder = GeoTiffBuilder::new(40, 30, class_at)
            .tiled(16, 16)
            .bigtiff()
            .nodata(250)
            .geokeys(NLCD_ALBERS_KEYS.to_vec())
            .geo_doubles(NLCD_ALBERS_DOUBLES.to_vec());
        if big_endian {
            builder = builder.big_endian();
        }
        let raster = open_bytes(&builder.build()).await.unwrap();
        let md = *raster.metadata();
        assert_eq!((md.width(), md.height()), (40, 30));
        assert_eq!(md.nodata, Some(250));
        assert!(matches!(md.crs, RasterCrs::Albers(_)));
        assert_pixels(&raster).await;
    }
}

#[tokio::test]
async fn lzw_tiles_decode_end_to_end() {
    let tiff = GeoTiffBuilder::new(40, 30, class_at).tiled(16, 16).lzw().build();
    let raster = open_bytes(&tiff).await.unwrap();
    assert_pixels(&raster).await;
}

#[tokio::test]
async fn packbits_strips_decode_end_to_end() {
    let tiff = GeoTiffBuilder::new(40, 30, class_at).strips(8).packbits().build();
    let raster = open_bytes(&tiff).await.unwrap();
    assert_eq!(raster.metadata().layout.tile_height, 8);
    assert_pixels(&raster).await;
}

#[tokio::test]
async fn non_tiff_file_is_a_format_error() {
    let file = write_temp(b"definitely not a tiff, just some bytes");
    let err = open_raster(file.path().to_str().unwrap(), &SourceOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ExposureError::Format(_)), "{err:?}");
}

#[tokio::test]
async fn missing_file_is_a_provider_error() {
    let err = open_raster("/no/such/raster.tif", &SourceOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ExposureError::Provider(_)), "{err:?}");
}
