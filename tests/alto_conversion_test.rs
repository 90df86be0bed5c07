//! ALTO conversion scenarios, end to end through flattening.

use mods2parquet::alto;
use mods2parquet::convert::Ctx;
use mods2parquet::value::{Record, Value, flatten};

fn record_from(xml: &str) -> Record {
    let doc = roxmltree::Document::parse(xml).unwrap();
    let mut ctx = Ctx::new(true);
    flatten(alto::to_record(doc.root_element(), &mut ctx).unwrap())
}

#[test]
fn test_page_counts() {
    // Elements below Layout/Page are counted as a structural fingerprint.
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Layout>
        <Page ID="Page1" PHYSICAL_IMG_NR="1">
            <TextBlock ID="Page1_Block1">
              <TextLine>
                <String STYLE="bold" WC="0.8937500119" CONTENT="Staatsbibliothek" />
              </TextLine>
              <TextLine>
                <String STYLE="bold" WC="0.8899999857" CONTENT="zu" />
                <String STYLE="bold" WC="0.9866666794" CONTENT="Berlin" />
              </TextLine>
              <TextLine>
                <String STYLE="bold" WC="1." CONTENT="WM" />
                <String STYLE="bold" WC="0.8927272558" CONTENT="Preußischer" />
                <String STYLE="bold" WC="0.9058333039" CONTENT="Kulturbesitz" />
              </TextLine>
            </TextBlock>
        </Page>
      </Layout>
    </alto>
    "#,
    );
    assert_eq!(d.get("Layout_Page_TextBlock-count"), Some(&Value::Int(1)));
    assert_eq!(d.get("Layout_Page_TextLine-count"), Some(&Value::Int(3)));
    assert_eq!(d.get("Layout_Page_String-count"), Some(&Value::Int(6)));
}

#[test]
fn test_word_confidence_statistics() {
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Layout>
        <Page ID="Page1">
            <TextBlock>
              <TextLine>
                <String WC="0.5" CONTENT="a" />
                <String WC="1.0" CONTENT="b" />
              </TextLine>
            </TextBlock>
        </Page>
      </Layout>
    </alto>
    "#,
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String/@WC-mean"),
        Some(&Value::Float(0.75))
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String/@WC-median"),
        Some(&Value::Float(0.75))
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String/@WC-min"),
        Some(&Value::Float(0.5))
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String/@WC-max"),
        Some(&Value::Float(1.0))
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String/@WC-std"),
        Some(&Value::Float(0.25))
    );
}

#[test]
fn test_word_confidence_absent_means_no_columns() {
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Layout>
        <Page ID="Page1">
            <TextBlock><TextLine><String CONTENT="a"/></TextLine></TextBlock>
        </Page>
      </Layout>
    </alto>
    "#,
    );
    assert!(!d.contains_key("Layout_Page_//alto:String/@WC-mean"));
    assert!(!d.contains_key("Layout_Page_//alto:String/@WC-std"));
}

#[test]
fn test_tags_counts() {
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Tags>
        <NamedEntityTag ID="PER0" LABEL="Pentlings"/>
        <NamedEntityTag ID="LOC1" LABEL="Pentling"/>
        <NamedEntityTag ID="LOC2" LABEL="Hamm"/>
        <NamedEntityTag ID="PER4" LABEL="Hofes Pentling"/>
        <NamedEntityTag ID="LOC5" LABEL="Hofs Pentling"/>
        <NamedEntityTag ID="LOC7" LABEL="Hilbeck"/>
        <NamedEntityTag ID="PER8" LABEL="Hoff"/>
        <NamedEntityTag ID="PER9" LABEL="L i b e r"/>
        <NamedEntityTag ID="PER10" LABEL="Jhesu Christi"/>
      </Tags>
    </alto>
    "#,
    );
    assert_eq!(d.get("Tags_NamedEntityTag-count"), Some(&Value::Int(9)));
}

#[test]
fn test_string_tagref_counts() {
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Layout>
      <Page>
      <PrintSpace>
      <TextBlock>
        <TextLine>
          <String CONTENT="Pentlings" HEIGHT="33" HPOS="330" TAGREFS="PER0" VPOS="699" WC="0.4511111081" WIDTH="146"/>
        </TextLine>
        <TextLine>
          <String CONTENT="Pentlings" HEIGHT="33" HPOS="330" TAGREFS="PER0" VPOS="699" WC="0.4511111081" WIDTH="146"/>
          <String CONTENT="Pentlings" HEIGHT="33" HPOS="330" TAGREFS="PER0" VPOS="699" WC="0.4511111081" WIDTH="146"/>
          <String CONTENT="No TAGREF!" />
        </TextLine>
      </TextBlock>
      </PrintSpace>
      </Page>
      </Layout>
    </alto>
    "#,
    );
    assert_eq!(
        d.get("Layout_Page_//alto:String[@TAGREFS]-count"),
        Some(&Value::Int(3))
    );
    assert_eq!(d.get("Layout_Page_String-count"), Some(&Value::Int(4)));
}

#[test]
fn test_description_and_processing() {
    let d = record_from(
        r#"
    <alto xmlns="http://www.loc.gov/standards/alto/ns-v2#">
      <Description>
        <MeasurementUnit>pixel</MeasurementUnit>
        <sourceImageInformation>
          <fileName>00000007.tif</fileName>
        </sourceImageInformation>
        <OCRProcessing ID="OCRPROCESSING_1">
          <ocrProcessingStep>
            <processingDateTime>2019-02-09</processingDateTime>
            <processingSoftware>
              <softwareCreator>ABBYY</softwareCreator>
              <softwareName>FineReader</softwareName>
              <softwareVersion>11</softwareVersion>
            </processingSoftware>
          </ocrProcessingStep>
        </OCRProcessing>
      </Description>
    </alto>
    "#,
    );
    assert_eq!(
        d.get("Description_MeasurementUnit"),
        Some(&Value::Text("pixel".to_string()))
    );
    assert_eq!(
        d.get("Description_sourceImageInformation_fileName"),
        Some(&Value::Text("00000007.tif".to_string()))
    );
    assert_eq!(
        d.get("Description_OCRProcessing_ocrProcessingStep0_processingSoftware_softwareName"),
        Some(&Value::Text("FineReader".to_string()))
    );
    assert_eq!(
        d.get("Description_OCRProcessing_ocrProcessingStep0_processingDateTime"),
        Some(&Value::Text("2019-02-09".to_string()))
    );
}

#[test]
fn test_vendor_namespace_is_recognized() {
    let doc = roxmltree::Document::parse(
        r#"<alto xmlns="http://schema.ccs-gmbh.com/ALTO">
             <Layout><Page ID="P1"/></Layout>
           </alto>"#,
    )
    .unwrap();
    let mut ctx = Ctx::new(true);
    let d = flatten(mods2parquet::to_record(doc.root_element(), &mut ctx).unwrap());
    assert_eq!(d.get("Layout_Page_ID"), Some(&Value::Text("P1".to_string())));
}
